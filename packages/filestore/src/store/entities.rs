use std::collections::{HashMap, HashSet};

use chrono::Utc;
use common::{EntityType, StorageDiff};
use sea_orm::sea_query::{Expr, ExprTrait, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use tracing::{debug, instrument, warn};

use super::FileStore;
use crate::entity::{blob, file, file_blob};
use crate::error::StoreError;
use crate::validate::ValidationError;

/// Arguments for [`FileStore::create_entity`].
#[derive(Debug, Clone)]
pub struct EntityParams {
    pub entity_type: EntityType,
    pub source: String,
    pub size: i64,
    pub storage_policy_id: i32,
    pub created_by: Option<i32>,
    /// Marks the entity as a placeholder for an upload that is still running.
    pub upload_session_id: Option<String>,
    /// Credit the file owner with the entity's size.
    pub bill: bool,
}

impl<C: ConnectionTrait> FileStore<'_, C> {
    pub async fn get_entity(&self, id: i32) -> Result<blob::Model, StoreError> {
        blob::Entity::find_by_id(id)
            .one(self.conn)
            .await?
            .ok_or_else(|| StoreError::not_found("entity", id))
    }

    /// Entities attached to a file, newest first, optionally of one type only.
    pub async fn file_entities(
        &self,
        file_id: i32,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<blob::Model>, StoreError> {
        let ids: Vec<i32> = file_blob::Entity::find()
            .select_only()
            .column(file_blob::Column::EntityId)
            .filter(file_blob::Column::FileId.eq(file_id))
            .into_tuple()
            .all(self.conn)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut entities = Vec::with_capacity(ids.len());
        for predicate in self.limits.predicates(1, blob::Column::Id, &ids) {
            let mut query = blob::Entity::find().filter(predicate);
            if let Some(ty) = entity_type {
                query = query.filter(blob::Column::EntityType.eq(ty));
            }
            entities.extend(query.all(self.conn).await?);
        }
        entities.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(entities)
    }

    /// Stale entities awaiting the hard-delete sweep, oldest first.
    pub async fn stale_entities(&self, limit: u64) -> Result<Vec<blob::Model>, StoreError> {
        Ok(blob::Entity::find()
            .filter(blob::Column::ReferenceCount.lte(0))
            .order_by_asc(blob::Column::Id)
            .limit(limit)
            .all(self.conn)
            .await?)
    }

    /// Attach content to `file`.
    ///
    /// An entity already stored at the same `(policy, source)` is reused and
    /// its reference count incremented instead of inserting a duplicate row.
    /// Attaching an entity the file already holds changes nothing and bills
    /// nothing, so references always equal attachment edges. Entities created without an upload session are active immediately; a
    /// version entity created that way also becomes the file's primary entity.
    #[instrument(skip(self, file, params), fields(file_id = file.id, source = %params.source))]
    pub async fn create_entity(
        &self,
        file: &file::Model,
        params: EntityParams,
    ) -> Result<(blob::Model, StorageDiff), StoreError> {
        if file.is_folder() {
            return Err(ValidationError::NotAFile(file.id).into());
        }

        let existing = blob::Entity::find()
            .filter(blob::Column::StoragePolicyId.eq(params.storage_policy_id))
            .filter(blob::Column::Source.eq(params.source.as_str()))
            .one(self.conn)
            .await?;

        let (entity, linked) = match existing {
            Some(found) => {
                if self.is_attached(file.id, found.id).await? {
                    debug!(entity_id = found.id, "Entity already attached to file");
                    (found, false)
                } else {
                    debug!(entity_id = found.id, "Reusing entity with identical source");
                    self.add_references(&[found.id], 1).await?;
                    (self.get_entity(found.id).await?, true)
                }
            }
            None => {
                let now = Utc::now();
                let created = blob::ActiveModel {
                    entity_type: Set(params.entity_type),
                    source: Set(params.source.clone()),
                    size: Set(params.size),
                    storage_policy_id: Set(params.storage_policy_id),
                    created_by: Set(params.created_by),
                    reference_count: Set(1),
                    upload_session_id: Set(params.upload_session_id.clone()),
                    recycle_options: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(self.conn)
                .await?;
                (created, true)
            }
        };

        // One reference and one billing per attachment edge.
        if linked {
            self.attach(file.id, &[entity.id]).await?;
        }

        if !entity.is_placeholder() && entity.entity_type == EntityType::Version {
            self.set_primary(file.id, Some(&entity)).await?;
        }

        let diff = if params.bill && linked {
            StorageDiff::single(file.owner_id, entity.size)
        } else {
            StorageDiff::new()
        };
        Ok((entity, diff))
    }

    /// Finish an upload: clear the placeholder marker and, for versions,
    /// promote the entity to the file's primary content.
    pub async fn upgrade_placeholder(
        &self,
        file: &file::Model,
        entity_id: i32,
        entity_type: EntityType,
    ) -> Result<blob::Model, StoreError> {
        if !self.is_attached(file.id, entity_id).await? {
            return Err(StoreError::NotFound(format!(
                "entity {entity_id} attached to file {}",
                file.id
            )));
        }

        let entity = self.get_entity(entity_id).await?;
        let mut active: blob::ActiveModel = entity.into();
        active.upload_session_id = Set(None);
        active.updated_at = Set(Utc::now());
        let entity = active.update(self.conn).await?;

        if entity_type == EntityType::Version {
            self.set_primary(file.id, Some(&entity)).await?;
        }
        Ok(entity)
    }

    /// Keep the newest `max` entities of `entity_type` and unlink the rest.
    #[instrument(skip(self, file), fields(file_id = file.id))]
    pub async fn cap_entities(
        &self,
        file: &file::Model,
        owner_id: i32,
        max: usize,
        entity_type: EntityType,
    ) -> Result<StorageDiff, StoreError> {
        let entities = self.file_entities(file.id, Some(entity_type)).await?;

        let mut diff = StorageDiff::new();
        for entity in entities.iter().skip(max) {
            diff.merge(self.unlink_entity(entity, file, owner_id).await?);
        }
        Ok(diff)
    }

    /// Detach one entity from one file and drop one reference.
    pub async fn unlink_entity(
        &self,
        entity: &blob::Model,
        file: &file::Model,
        owner_id: i32,
    ) -> Result<StorageDiff, StoreError> {
        let res = file_blob::Entity::delete_many()
            .filter(file_blob::Column::FileId.eq(file.id))
            .filter(file_blob::Column::EntityId.eq(entity.id))
            .exec(self.conn)
            .await?;
        if res.rows_affected == 0 {
            return Err(StoreError::NotFound(format!(
                "entity {} attached to file {}",
                entity.id, file.id
            )));
        }

        self.add_references(&[entity.id], -1).await?;

        file::Entity::update_many()
            .col_expr(file::Column::PrimaryEntityId, Expr::value(Option::<i32>::None))
            .filter(file::Column::Id.eq(file.id))
            .filter(file::Column::PrimaryEntityId.eq(entity.id))
            .exec(self.conn)
            .await?;

        Ok(StorageDiff::single(owner_id, -entity.size))
    }

    /// Roll back an interrupted create: drop every placeholder entity that
    /// only this file references.
    pub async fn remove_stale_entities(&self, file: &file::Model) -> Result<StorageDiff, StoreError> {
        let stale: Vec<blob::Model> = self
            .file_entities(file.id, None)
            .await?
            .into_iter()
            .filter(|e| e.reference_count == 1 && e.is_placeholder())
            .collect();
        if stale.is_empty() {
            return Ok(StorageDiff::new());
        }

        let ids: Vec<i32> = stale.iter().map(|e| e.id).collect();
        let size: i64 = stale.iter().map(|e| e.size).sum();

        file_blob::Entity::delete_many()
            .filter(file_blob::Column::FileId.eq(file.id))
            .filter(file_blob::Column::EntityId.is_in(ids.iter().copied()))
            .exec(self.conn)
            .await?;
        self.add_references(&ids, -1).await?;

        debug!(file_id = file.id, count = ids.len(), "Removed stale placeholder entities");
        Ok(StorageDiff::single(file.owner_id, -size))
    }

    /// Force-remove entity rows by id.
    ///
    /// Entities that still carry references are an accounting inconsistency:
    /// their size is collected per owner of every attached file, each case is
    /// logged, and the rows are removed anyway. Returns bytes removed per owner.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn remove_entities_by_id(&self, ids: &[i32]) -> Result<HashMap<i32, i64>, StoreError> {
        let mut removed: HashMap<i32, i64> = HashMap::new();

        for chunk in self.limits.chunks(1, ids) {
            let live = blob::Entity::find()
                .filter(blob::Column::Id.is_in(chunk.iter().copied()))
                .filter(blob::Column::ReferenceCount.gt(0))
                .all(self.conn)
                .await?;

            if !live.is_empty() {
                let sizes: HashMap<i32, i64> = live.iter().map(|e| (e.id, e.size)).collect();
                let live_ids: Vec<i32> = sizes.keys().copied().collect();
                let links = file_blob::Entity::find()
                    .filter(file_blob::Column::EntityId.is_in(live_ids))
                    .all(self.conn)
                    .await?;

                let file_ids: Vec<i32> = links
                    .iter()
                    .map(|l| l.file_id)
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                let owners = self.owners_of(&file_ids).await?;

                for link in &links {
                    let (Some(owner_id), Some(size)) =
                        (owners.get(&link.file_id), sizes.get(&link.entity_id))
                    else {
                        continue;
                    };
                    warn!(
                        entity_id = link.entity_id,
                        file_id = link.file_id,
                        owner_id,
                        size,
                        "Force-removing entity that is still referenced"
                    );
                    *removed.entry(*owner_id).or_insert(0) += size;
                }
            }

            file_blob::Entity::delete_many()
                .filter(file_blob::Column::EntityId.is_in(chunk.iter().copied()))
                .exec(self.conn)
                .await?;
            file::Entity::update_many()
                .col_expr(file::Column::PrimaryEntityId, Expr::value(Option::<i32>::None))
                .filter(file::Column::PrimaryEntityId.is_in(chunk.iter().copied()))
                .exec(self.conn)
                .await?;
            blob::Entity::delete_many()
                .filter(blob::Column::Id.is_in(chunk.iter().copied()))
                .exec(self.conn)
                .await?;
        }

        Ok(removed)
    }

    /// Point an entity at bytes already written under another policy, and
    /// move the files it backs onto that policy. The entity keeps its id.
    pub async fn relocate_entity(
        &self,
        entity: &blob::Model,
        storage_policy_id: i32,
        source: &str,
        file_ids: &[i32],
    ) -> Result<blob::Model, StoreError> {
        let updated = blob::ActiveModel {
            id: Set(entity.id),
            storage_policy_id: Set(storage_policy_id),
            source: Set(source.to_string()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(self.conn)
        .await?;

        for predicate in self.limits.predicates(1, file::Column::Id, file_ids) {
            file::Entity::update_many()
                .col_expr(file::Column::StoragePolicyId, Expr::value(storage_policy_id))
                .col_expr(file::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(predicate)
                .exec(self.conn)
                .await?;
        }
        Ok(updated)
    }

    /// Relative reference-count update, safe against concurrent writers.
    pub(super) async fn add_references(&self, ids: &[i32], delta: i32) -> Result<(), StoreError> {
        for predicate in self.limits.predicates(1, blob::Column::Id, ids) {
            blob::Entity::update_many()
                .col_expr(
                    blob::Column::ReferenceCount,
                    Expr::col(blob::Column::ReferenceCount).add(delta),
                )
                .col_expr(blob::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(predicate)
                .exec(self.conn)
                .await?;
        }
        Ok(())
    }

    /// Insert attachment edges, ignoring ones that already exist.
    pub(super) async fn attach(&self, file_id: i32, entity_ids: &[i32]) -> Result<(), StoreError> {
        if entity_ids.is_empty() {
            return Ok(());
        }

        let rows = entity_ids.iter().map(|entity_id| file_blob::ActiveModel {
            file_id: Set(file_id),
            entity_id: Set(*entity_id),
        });
        let result = file_blob::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::columns([file_blob::Column::FileId, file_blob::Column::EntityId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await;

        match result {
            Ok(_) | Err(DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_attached(&self, file_id: i32, entity_id: i32) -> Result<bool, StoreError> {
        Ok(file_blob::Entity::find_by_id((file_id, entity_id))
            .one(self.conn)
            .await?
            .is_some())
    }

    async fn set_primary(&self, file_id: i32, entity: Option<&blob::Model>) -> Result<(), StoreError> {
        let mut model = file::ActiveModel {
            id: Set(file_id),
            primary_entity_id: Set(entity.map(|e| e.id)),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(entity) = entity {
            model.size = Set(entity.size);
        }
        model.update(self.conn).await?;
        Ok(())
    }

    async fn owners_of(&self, file_ids: &[i32]) -> Result<HashMap<i32, i32>, StoreError> {
        let mut owners = HashMap::with_capacity(file_ids.len());
        for predicate in self.limits.predicates(1, file::Column::Id, file_ids) {
            let page: Vec<(i32, i32)> = file::Entity::find()
                .select_only()
                .column(file::Column::Id)
                .column(file::Column::OwnerId)
                .filter(predicate)
                .into_tuple()
                .all(self.conn)
                .await?;
            owners.extend(page);
        }
        Ok(owners)
    }
}
