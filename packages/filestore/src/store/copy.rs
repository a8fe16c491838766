use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use common::StorageDiff;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::{debug, instrument};

use super::FileStore;
use crate::entity::{file, metadata};
use crate::error::StoreError;

impl<C: ConnectionTrait> FileStore<'_, C> {
    /// Duplicate `files` under new parents, sharing their content.
    ///
    /// `destinations` maps a source parent id (`None` for the root) to the
    /// folder its children are copied into. Files must be ordered parents
    /// first: every copied folder becomes the destination for its own
    /// children. Non-placeholder entities gain one reference per copy and
    /// the destination owner is credited with their size.
    ///
    /// Returns the new file for each source file id.
    #[instrument(skip(self, files, destinations), fields(count = files.len()))]
    pub async fn copy(
        &self,
        files: &[file::Model],
        destinations: &HashMap<Option<i32>, file::Model>,
    ) -> Result<(HashMap<i32, file::Model>, StorageDiff), StoreError> {
        let mut parents = destinations.clone();
        let mut copies: HashMap<i32, file::Model> = HashMap::with_capacity(files.len());

        let content_ids: Vec<i32> = files.iter().filter(|f| !f.is_folder()).map(|f| f.id).collect();
        let mut content: HashMap<i32, Vec<_>> = HashMap::new();
        for (file_id, entity) in self.attachments(&content_ids).await? {
            if !entity.is_placeholder() {
                content.entry(file_id).or_default().push(entity);
            }
        }

        let mut diff = StorageDiff::new();
        let mut increments: HashMap<i32, i32> = HashMap::new();
        let now = Utc::now();

        for src in files {
            let dst = parents.get(&src.parent_id).ok_or_else(|| {
                StoreError::NotFound(format!("destination for children of {:?}", src.parent_id))
            })?;
            let owner_id = dst.owner_id;

            let copied = file::ActiveModel {
                owner_id: Set(owner_id),
                parent_id: Set(Some(dst.id)),
                name: Set(src.name.clone()),
                file_type: Set(src.file_type),
                size: Set(src.size),
                primary_entity_id: Set(src.primary_entity_id),
                storage_policy_id: Set(src.storage_policy_id),
                deleted_at: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(self.conn)
            .await?;

            self.copy_metadata(src.id, copied.id).await?;

            if let Some(entities) = content.get(&src.id) {
                let ids: Vec<i32> = entities.iter().map(|e| e.id).collect();
                self.attach(copied.id, &ids).await?;
                for entity in entities {
                    *increments.entry(entity.id).or_insert(0) += 1;
                    diff.add(owner_id, entity.size);
                }
            }

            if copied.is_folder() {
                parents.insert(Some(src.id), copied.clone());
            }
            copies.insert(src.id, copied);
        }

        let mut by_amount: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
        for (entity_id, amount) in increments {
            by_amount.entry(amount).or_default().push(entity_id);
        }
        for (amount, ids) in &by_amount {
            self.add_references(ids, *amount).await?;
        }

        debug!(files = copies.len(), "Copied files");
        Ok((copies, diff))
    }

    async fn copy_metadata(&self, from: i32, to: i32) -> Result<(), StoreError> {
        let rows = metadata::Entity::find()
            .filter(metadata::Column::FileId.eq(from))
            .all(self.conn)
            .await?;
        if rows.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        metadata::Entity::insert_many(rows.into_iter().map(|m| metadata::ActiveModel {
            file_id: Set(to),
            name: Set(m.name),
            value: Set(m.value),
            is_public: Set(m.is_public),
            created_at: Set(now),
            ..Default::default()
        }))
        .exec_without_returning(self.conn)
        .await?;
        Ok(())
    }
}
