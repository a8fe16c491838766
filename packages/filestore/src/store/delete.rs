use std::collections::{BTreeMap, HashMap};

use common::StorageDiff;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::{debug, instrument};

use super::FileStore;
use crate::entity::blob::{self, RecycleOptions};
use crate::entity::{direct_link, file, file_blob, metadata, share};
use crate::error::StoreError;

impl<C: ConnectionTrait> FileStore<'_, C> {
    /// Hard-delete `files` and release their entities.
    ///
    /// Every attachment drops one reference from its entity and debits the
    /// file's owner by the entity's size. Entities left with no references are
    /// tagged with `recycle` and returned for the hard-delete sweep. Callers
    /// expand folders and filter out soft links beforehand.
    #[instrument(skip(self, files, recycle), fields(count = files.len()))]
    pub async fn delete(
        &self,
        files: &[file::Model],
        recycle: RecycleOptions,
    ) -> Result<(Vec<blob::Model>, StorageDiff), StoreError> {
        if files.is_empty() {
            return Ok((Vec::new(), StorageDiff::new()));
        }

        let owners: HashMap<i32, i32> = files.iter().map(|f| (f.id, f.owner_id)).collect();
        let file_ids: Vec<i32> = owners.keys().copied().collect();
        let attached = self.attachments(&file_ids).await?;

        let mut diff = StorageDiff::new();
        let mut decrements: HashMap<i32, i32> = HashMap::new();
        for (file_id, entity) in &attached {
            if let Some(owner_id) = owners.get(file_id) {
                diff.add(*owner_id, -entity.size);
            }
            *decrements.entry(entity.id).or_insert(0) += 1;
        }

        // One relative update per distinct decrement amount.
        let mut by_amount: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
        for (entity_id, amount) in &decrements {
            by_amount.entry(*amount).or_default().push(*entity_id);
        }
        for (amount, ids) in &by_amount {
            self.add_references(ids, -amount).await?;
        }

        for predicate in self.limits.predicates(1, file_blob::Column::FileId, &file_ids) {
            file_blob::Entity::delete_many()
                .filter(predicate)
                .exec(self.conn)
                .await?;
        }

        let touched: Vec<i32> = decrements.keys().copied().collect();
        let mut orphaned = Vec::new();
        for predicate in self.limits.predicates(1, blob::Column::Id, &touched) {
            blob::Entity::update_many()
                .set(blob::ActiveModel {
                    recycle_options: Set(Some(recycle.clone())),
                    ..Default::default()
                })
                .filter(predicate.clone())
                .filter(blob::Column::ReferenceCount.lte(0))
                .exec(self.conn)
                .await?;
            orphaned.extend(
                blob::Entity::find()
                    .filter(predicate)
                    .filter(blob::Column::ReferenceCount.lte(0))
                    .all(self.conn)
                    .await?,
            );
        }
        orphaned.sort_by_key(|e| e.id);

        for predicate in self.limits.predicates(1, metadata::Column::FileId, &file_ids) {
            metadata::Entity::delete_many()
                .filter(predicate)
                .exec(self.conn)
                .await?;
        }
        for predicate in self.limits.predicates(1, share::Column::FileId, &file_ids) {
            share::Entity::delete_many()
                .filter(predicate)
                .exec(self.conn)
                .await?;
        }
        for predicate in self.limits.predicates(1, direct_link::Column::FileId, &file_ids) {
            direct_link::Entity::delete_many()
                .filter(predicate)
                .exec(self.conn)
                .await?;
        }
        for predicate in self.limits.predicates(1, file::Column::Id, &file_ids) {
            file::Entity::delete_many()
                .filter(predicate)
                .exec(self.conn)
                .await?;
        }

        debug!(
            files = file_ids.len(),
            entities = decrements.len(),
            orphaned = orphaned.len(),
            "Deleted files"
        );
        Ok((orphaned, diff))
    }
}
