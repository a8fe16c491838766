use std::collections::HashMap;

use async_trait::async_trait;
use common::StorageDiff;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QuerySelect, Set,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::batch::BatchLimits;
use crate::entity::{blob, file, file_blob, user};
use crate::error::StoreError;

/// One owner row that could not be updated.
#[derive(Debug)]
pub struct QuotaFailure {
    pub owner_id: i32,
    pub delta: i64,
    pub error: StoreError,
}

/// Aggregate of every per-owner failure from one diff application.
#[derive(Debug, Error)]
#[error("failed to apply storage diff to {} owner(s)", .failures.len())]
pub struct QuotaError {
    pub failures: Vec<QuotaFailure>,
}

/// Receives committed storage diffs.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Apply every owner's delta independently. A failing owner does not stop
    /// the others; all failures come back together.
    async fn apply_storage_diff(&self, diff: &StorageDiff) -> Result<(), QuotaError>;
}

/// Quota kept in the `storage` column of the `users` table.
#[derive(Clone)]
pub struct UserQuota {
    db: DatabaseConnection,
}

impl UserQuota {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl QuotaStore for UserQuota {
    #[instrument(skip(self, diff), fields(owners = diff.len()))]
    async fn apply_storage_diff(&self, diff: &StorageDiff) -> Result<(), QuotaError> {
        let mut failures = Vec::new();

        for owner_id in diff.owners() {
            let delta = diff.get(owner_id);
            if delta == 0 {
                continue;
            }

            let result = user::Entity::update_many()
                .col_expr(user::Column::Storage, Expr::col(user::Column::Storage).add(delta))
                .filter(user::Column::Id.eq(owner_id))
                .exec(&self.db)
                .await;

            let error = match result {
                Ok(res) if res.rows_affected > 0 => continue,
                Ok(_) => StoreError::not_found("owner", owner_id),
                Err(e) => e.into(),
            };
            warn!(owner_id, delta, error = %error, "Failed to apply storage diff");
            failures.push(QuotaFailure {
                owner_id,
                delta,
                error,
            });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(QuotaError { failures })
        }
    }
}

/// Recompute an owner's usage from scratch: the size of every entity attached
/// to one of the owner's files, counted once per attachment.
pub async fn calculate_storage<C: ConnectionTrait>(conn: &C, owner_id: i32) -> Result<i64, StoreError> {
    let limits = BatchLimits::for_backend(conn.get_database_backend());

    let file_ids: Vec<i32> = file::Entity::find()
        .select_only()
        .column(file::Column::Id)
        .filter(file::Column::OwnerId.eq(owner_id))
        .into_tuple()
        .all(conn)
        .await?;

    let mut links: Vec<i32> = Vec::new();
    for predicate in limits.predicates(1, file_blob::Column::FileId, &file_ids) {
        let page: Vec<i32> = file_blob::Entity::find()
            .select_only()
            .column(file_blob::Column::EntityId)
            .filter(predicate)
            .into_tuple()
            .all(conn)
            .await?;
        links.extend(page);
    }

    let mut unique: Vec<i32> = links.clone();
    unique.sort_unstable();
    unique.dedup();

    let mut sizes: HashMap<i32, i64> = HashMap::with_capacity(unique.len());
    for predicate in limits.predicates(1, blob::Column::Id, &unique) {
        let page: Vec<(i32, i64)> = blob::Entity::find()
            .select_only()
            .column(blob::Column::Id)
            .column(blob::Column::Size)
            .filter(predicate)
            .into_tuple()
            .all(conn)
            .await?;
        sizes.extend(page);
    }

    Ok(links.iter().filter_map(|id| sizes.get(id)).sum())
}

/// Correct every owner whose stored usage drifted from the recomputed value.
///
/// Returns `(owner_id, stored, recomputed)` for each corrected owner.
#[instrument(skip(db))]
pub async fn recalculate_all(db: &DatabaseConnection) -> Result<Vec<(i32, i64, i64)>, StoreError> {
    let users = user::Entity::find().all(db).await?;
    let mut corrected = Vec::new();

    for owner in users {
        let actual = calculate_storage(db, owner.id).await?;
        if actual == owner.storage {
            continue;
        }

        warn!(
            owner_id = owner.id,
            stored = owner.storage,
            recomputed = actual,
            "Storage usage drifted, correcting"
        );
        let (id, stored) = (owner.id, owner.storage);
        let mut active: user::ActiveModel = owner.into();
        active.storage = Set(actual);
        active.update(db).await?;
        corrected.push((id, stored, actual));
    }

    info!(corrected = corrected.len(), "Storage recalculation finished");
    Ok(corrected)
}
