//! Moving entity bytes between storage policies.
//!
//! Entities are relocated in place: the row keeps its id and reference
//! count, only its `source` and `storage_policy_id` change. Each entity is
//! committed in its own transaction, so one failure never undoes the
//! entities relocated before it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::storage::{ByteMover, RuleNamer, SourceNamer, StorageError};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::entity::{blob, file, storage_policy};
use crate::error::StoreError;
use crate::policy::PolicyCache;
use crate::quota::QuotaStore;
use crate::store::FileStore;
use crate::tx::Tx;
use crate::validate::{EntityValidator, PolicyValidator};

/// Names tried per entity before giving up on a destination.
const MAX_NAME_ATTEMPTS: u32 = 3;

/// Resolves the byte-mover serving a storage policy.
pub trait MoverRegistry: Send + Sync {
    fn mover(&self, policy: &storage_policy::Model) -> Result<Arc<dyn ByteMover>, StoreError>;
}

/// Byte-movers registered by policy id.
#[derive(Default, Clone)]
pub struct MoverMap {
    movers: HashMap<i32, Arc<dyn ByteMover>>,
}

impl MoverMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy_id: i32, mover: Arc<dyn ByteMover>) -> Self {
        self.movers.insert(policy_id, mover);
        self
    }

    pub fn insert(&mut self, policy_id: i32, mover: Arc<dyn ByteMover>) {
        self.movers.insert(policy_id, mover);
    }
}

impl MoverRegistry for MoverMap {
    fn mover(&self, policy: &storage_policy::Model) -> Result<Arc<dyn ByteMover>, StoreError> {
        self.movers.get(&policy.id).cloned().ok_or_else(|| {
            StorageError::Backend(format!(
                "no byte-mover registered for policy {} ({})",
                policy.id, policy.policy_type
            ))
            .into()
        })
    }
}

/// Decides which old objects may be physically deleted after relocation.
///
/// Entities whose bytes still back a soft link must be left out.
#[async_trait]
pub trait SoftLinkFilter: Send + Sync {
    async fn deletable(&self, entities: Vec<blob::Model>) -> Result<Vec<blob::Model>, StoreError>;
}

/// Treats every entity as safe to delete.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSoftLinks;

#[async_trait]
impl SoftLinkFilter for NoSoftLinks {
    async fn deletable(&self, entities: Vec<blob::Model>) -> Result<Vec<blob::Model>, StoreError> {
        Ok(entities)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocated {
    pub entity_id: i32,
    pub from_policy: i32,
    pub to_policy: i32,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub entity_id: i32,
    pub reason: String,
}

#[derive(Debug)]
pub struct Failed {
    pub entity_id: i32,
    pub error: StoreError,
}

/// Outcome of one [`RelocationEngine::relocate`] call. Partial success is normal.
#[derive(Debug, Default)]
pub struct RelocationReport {
    pub relocated: Vec<Relocated>,
    pub skipped: Vec<Skipped>,
    pub failed: Vec<Failed>,
    /// Old objects that could not be deleted, one line per source or group.
    pub warnings: Vec<String>,
    /// Set when the token fired before every entity was processed.
    pub cancelled: bool,
}

impl RelocationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.warnings.is_empty() && !self.cancelled
    }
}

/// One entity and the files from the request it backs.
struct Candidate {
    entity: blob::Model,
    files: Vec<file::Model>,
}

pub struct RelocationEngine {
    db: DatabaseConnection,
    quota: Arc<dyn QuotaStore>,
    policies: PolicyCache,
    movers: Arc<dyn MoverRegistry>,
    namer: Arc<dyn SourceNamer>,
    validator: Arc<dyn EntityValidator>,
    soft_links: Arc<dyn SoftLinkFilter>,
}

impl RelocationEngine {
    pub fn new(
        db: DatabaseConnection,
        quota: Arc<dyn QuotaStore>,
        policies: PolicyCache,
        movers: Arc<dyn MoverRegistry>,
    ) -> Self {
        Self {
            db,
            quota,
            policies,
            movers,
            namer: Arc::new(RuleNamer),
            validator: Arc::new(PolicyValidator),
            soft_links: Arc::new(NoSoftLinks),
        }
    }

    pub fn with_namer(mut self, namer: Arc<dyn SourceNamer>) -> Self {
        self.namer = namer;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn EntityValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_soft_link_filter(mut self, filter: Arc<dyn SoftLinkFilter>) -> Self {
        self.soft_links = filter;
        self
    }

    /// Move every entity backing `files` onto `dst_policy_id`.
    ///
    /// Only failures to resolve the destination are returned as errors;
    /// everything per entity lands in the report. A destination name held
    /// by another entity or object is retried with a fresh name, and the
    /// entity fails with a conflict once the attempts run out.
    #[instrument(skip(self, files, cancel), fields(count = files.len()))]
    pub async fn relocate(
        &self,
        files: &[file::Model],
        dst_policy_id: i32,
        cancel: &CancellationToken,
    ) -> Result<RelocationReport, StoreError> {
        let dst = self.policies.get(&self.db, dst_policy_id).await?;
        let dst_mover = self.movers.mover(&dst)?;

        let mut report = RelocationReport::default();
        let groups = self.group_by_policy(files).await?;

        for (src_policy_id, candidates) in groups {
            if src_policy_id == dst.id {
                for c in &candidates {
                    info!(entity_id = c.entity.id, "Entity already on destination policy");
                    report.skipped.push(Skipped {
                        entity_id: c.entity.id,
                        reason: "already on destination policy".into(),
                    });
                }
                continue;
            }

            let src_mover = match self.source_mover(src_policy_id).await {
                Ok(mover) => mover,
                Err(e) => {
                    warn!(policy_id = src_policy_id, error = %e, "Cannot open source policy");
                    let reason = e.to_string();
                    report.failed.extend(candidates.iter().map(|c| Failed {
                        entity_id: c.entity.id,
                        error: StoreError::Storage(StorageError::Backend(reason.clone())),
                    }));
                    continue;
                }
            };

            let mut replaced = Vec::new();
            for candidate in candidates {
                if report.cancelled || cancel.is_cancelled() {
                    report.cancelled = true;
                    report.skipped.push(Skipped {
                        entity_id: candidate.entity.id,
                        reason: "cancelled".into(),
                    });
                    continue;
                }

                let entity_id = candidate.entity.id;
                match self
                    .relocate_one(&candidate, &dst, &*src_mover, &*dst_mover, cancel)
                    .await
                {
                    Ok(Outcome::Moved(moved)) => {
                        report.relocated.push(moved);
                        replaced.push(candidate.entity);
                    }
                    Ok(Outcome::Invalid(reason)) => {
                        warn!(entity_id, %reason, "Entity rejected by destination policy");
                        report.skipped.push(Skipped { entity_id, reason });
                    }
                    Err(StoreError::Cancelled) => {
                        report.cancelled = true;
                        report.skipped.push(Skipped {
                            entity_id,
                            reason: "cancelled".into(),
                        });
                    }
                    Err(error) => {
                        warn!(entity_id, error = %error, "Failed to relocate entity");
                        report.failed.push(Failed { entity_id, error });
                    }
                }
            }

            self.delete_old_objects(src_policy_id, &*src_mover, replaced, &mut report)
                .await;
        }

        info!(
            relocated = report.relocated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "Relocation finished"
        );
        Ok(report)
    }

    /// Entities of `files`, deduplicated and grouped by their current policy.
    async fn group_by_policy(
        &self,
        files: &[file::Model],
    ) -> Result<BTreeMap<i32, Vec<Candidate>>, StoreError> {
        let store = FileStore::new(&self.db);
        let mut by_entity: BTreeMap<i32, Candidate> = BTreeMap::new();

        for f in files.iter().filter(|f| !f.is_folder()) {
            for entity in store.file_entities(f.id, None).await? {
                if entity.is_placeholder() {
                    debug!(entity_id = entity.id, "Skipping placeholder entity");
                    continue;
                }
                by_entity
                    .entry(entity.id)
                    .or_insert_with(|| Candidate {
                        entity,
                        files: Vec::new(),
                    })
                    .files
                    .push(f.clone());
            }
        }

        let mut groups: BTreeMap<i32, Vec<Candidate>> = BTreeMap::new();
        for candidate in by_entity.into_values() {
            groups
                .entry(candidate.entity.storage_policy_id)
                .or_default()
                .push(candidate);
        }
        Ok(groups)
    }

    async fn source_mover(&self, policy_id: i32) -> Result<Arc<dyn ByteMover>, StoreError> {
        let policy = self.policies.get(&self.db, policy_id).await?;
        self.movers.mover(&policy)
    }

    async fn relocate_one(
        &self,
        candidate: &Candidate,
        dst: &storage_policy::Model,
        src_mover: &dyn ByteMover,
        dst_mover: &dyn ByteMover,
        cancel: &CancellationToken,
    ) -> Result<Outcome, StoreError> {
        let entity = &candidate.entity;
        let (owner_id, name) = candidate
            .files
            .first()
            .map(|f| (f.owner_id, f.name.as_str()))
            .ok_or_else(|| {
                StoreError::Inconsistent(format!(
                    "entity {} has no attached file in the request",
                    entity.id
                ))
            })?;

        if let Err(e) = self.validator.validate(dst, entity, name) {
            return Ok(Outcome::Invalid(e.to_string()));
        }

        let size = u64::try_from(entity.size)
            .map_err(|_| StoreError::Inconsistent(format!("entity {} has negative size", entity.id)))?;

        let mut written = None;
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let destination = self
                .namer
                .source_name(&dst.naming_rules(), owner_id, name);
            if self.source_taken(dst.id, &destination).await? {
                debug!(entity_id = entity.id, %destination, attempt, "Destination name in use");
                continue;
            }

            let transfer = async {
                let reader = src_mover.get(&entity.source).await?;
                dst_mover.put(reader, &destination, size).await
            };
            // Nothing to discard on cancel: an unfinished put never reaches
            // `destination`, and whatever is already there is not ours.
            let res = tokio::select! {
                _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                res = transfer => res,
            };
            match res {
                Ok(()) => {
                    written = Some(destination);
                    break;
                }
                Err(StorageError::AlreadyExists(_)) => {
                    debug!(entity_id = entity.id, %destination, attempt, "Destination object exists");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let destination = written.ok_or_else(|| {
            StoreError::Conflict(format!("no free destination name for entity {}", entity.id))
        })?;

        let file_ids: Vec<i32> = candidate.files.iter().map(|f| f.id).collect();
        if let Err(e) = self.record(entity, dst.id, &destination, &file_ids).await {
            discard(dst_mover, &destination).await;
            return Err(e);
        }

        debug!(entity_id = entity.id, %destination, "Relocated entity");
        Ok(Outcome::Moved(Relocated {
            entity_id: entity.id,
            from_policy: entity.storage_policy_id,
            to_policy: dst.id,
            source: destination,
        }))
    }

    /// Whether another entity already claims `source` on `policy_id`.
    async fn source_taken(&self, policy_id: i32, source: &str) -> Result<bool, StoreError> {
        let count = blob::Entity::find()
            .filter(blob::Column::StoragePolicyId.eq(policy_id))
            .filter(blob::Column::Source.eq(source))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn record(
        &self,
        entity: &blob::Model,
        policy_id: i32,
        source: &str,
        file_ids: &[i32],
    ) -> Result<(), StoreError> {
        let tx = Tx::begin(&self.db, Arc::clone(&self.quota)).await?;
        let result = FileStore::new(tx.conn())
            .relocate_entity(entity, policy_id, source, file_ids)
            .await;
        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn delete_old_objects(
        &self,
        policy_id: i32,
        mover: &dyn ByteMover,
        replaced: Vec<blob::Model>,
        report: &mut RelocationReport,
    ) {
        if replaced.is_empty() {
            return;
        }

        let deletable = match self.soft_links.deletable(replaced).await {
            Ok(entities) => entities,
            Err(e) => {
                report
                    .warnings
                    .push(format!("policy {policy_id}: soft-link check failed: {e}"));
                return;
            }
        };
        let sources: Vec<String> = deletable.into_iter().map(|e| e.source).collect();
        if sources.is_empty() {
            return;
        }

        match mover.delete(&sources).await {
            Ok(failed) => {
                for source in failed {
                    warn!(policy_id, %source, "Failed to delete relocated object");
                    report
                        .warnings
                        .push(format!("policy {policy_id}: failed to delete {source}"));
                }
            }
            Err(e) => {
                warn!(policy_id, error = %e, "Failed to delete relocated objects");
                report
                    .warnings
                    .push(format!("policy {policy_id}: delete failed: {e}"));
            }
        }
    }
}

enum Outcome {
    Moved(Relocated),
    Invalid(String),
}

/// Best-effort removal of an object this relocation wrote but could not record.
async fn discard(mover: &dyn ByteMover, source: &str) {
    match mover.delete(&[source.to_string()]).await {
        Ok(failed) if failed.is_empty() => {}
        Ok(_) => warn!(%source, "Failed to discard relocated object"),
        Err(e) => warn!(%source, error = %e, "Failed to discard relocated object"),
    }
}
