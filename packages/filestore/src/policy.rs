use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::debug;

use crate::batch::BatchLimits;
use crate::entity::storage_policy;
use crate::error::StoreError;

/// Storage policies cached by id.
///
/// Every write through [`save`](Self::save) or [`delete`](Self::delete)
/// invalidates the entry; lookups already in flight may still return the
/// previous row.
#[derive(Debug, Default, Clone)]
pub struct PolicyCache {
    entries: Arc<DashMap<i32, Arc<storage_policy::Model>>>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i32,
    ) -> Result<Arc<storage_policy::Model>, StoreError> {
        if let Some(hit) = self.entries.get(&id) {
            return Ok(Arc::clone(hit.value()));
        }

        let policy = storage_policy::Entity::find_by_id(id)
            .one(conn)
            .await?
            .map(Arc::new)
            .ok_or_else(|| StoreError::not_found("storage policy", id))?;
        self.entries.insert(id, Arc::clone(&policy));
        Ok(policy)
    }

    /// Resolve several policies; unknown ids are an error.
    pub async fn get_many<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[i32],
    ) -> Result<Vec<Arc<storage_policy::Model>>, StoreError> {
        let missing: Vec<i32> = ids
            .iter()
            .copied()
            .filter(|id| !self.entries.contains_key(id))
            .collect();

        let limits = BatchLimits::for_backend(conn.get_database_backend());
        for predicate in limits.predicates(1, storage_policy::Column::Id, &missing) {
            let rows = storage_policy::Entity::find()
                .filter(predicate)
                .all(conn)
                .await?;
            for row in rows {
                self.entries.insert(row.id, Arc::new(row));
            }
        }

        ids.iter()
            .map(|id| {
                self.entries
                    .get(id)
                    .map(|hit| Arc::clone(hit.value()))
                    .ok_or_else(|| StoreError::not_found("storage policy", id))
            })
            .collect()
    }

    /// Insert a policy (id unset) or update an existing one, then drop it from the cache.
    pub async fn save<C: ConnectionTrait>(
        &self,
        conn: &C,
        mut policy: storage_policy::ActiveModel,
    ) -> Result<storage_policy::Model, StoreError> {
        policy.updated_at = Set(Utc::now());
        // `Set` or `Unchanged` (a loaded row) both mean the row exists.
        let saved = if !policy.id.is_not_set() {
            policy.update(conn).await?
        } else {
            if policy.created_at.is_not_set() {
                policy.created_at = Set(Utc::now());
            }
            policy.insert(conn).await?
        };

        self.invalidate(saved.id);
        Ok(saved)
    }

    pub async fn delete<C: ConnectionTrait>(&self, conn: &C, id: i32) -> Result<(), StoreError> {
        let res = storage_policy::Entity::delete_by_id(id).exec(conn).await?;
        self.invalidate(id);
        if res.rows_affected == 0 {
            return Err(StoreError::not_found("storage policy", id));
        }
        Ok(())
    }

    pub fn invalidate(&self, id: i32) {
        if self.entries.remove(&id).is_some() {
            debug!(policy_id = id, "Invalidated cached storage policy");
        }
    }
}
