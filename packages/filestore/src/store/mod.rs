//! File and entity bookkeeping.
//!
//! Every change to an entity's reference count goes through one of the
//! named operations in this module (`create_entity`, `unlink_entity`,
//! `cap_entities`, `remove_stale_entities`, `delete`, `copy`,
//! `remove_entities_by_id`). Operations that change billable bytes return a
//! [`StorageDiff`](common::StorageDiff) for the caller to append to its
//! transaction scope.

mod copy;
mod delete;
mod entities;

use std::collections::HashMap;

use chrono::Utc;
use common::FileType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::instrument;

use crate::batch::BatchLimits;
use crate::entity::{blob, direct_link, file, file_blob, metadata, share};
use crate::error::StoreError;
use crate::validate::ValidationError;

pub use entities::EntityParams;

/// Arguments for [`FileStore::create_file`].
#[derive(Debug, Clone)]
pub struct CreateFileParams {
    pub owner_id: i32,
    pub parent_id: Option<i32>,
    pub name: String,
    pub file_type: FileType,
    /// Declared size, authoritative until a version entity is attached.
    pub size: i64,
    pub storage_policy_id: Option<i32>,
}

pub struct FileStore<'a, C: ConnectionTrait> {
    conn: &'a C,
    limits: BatchLimits,
}

impl<'a, C: ConnectionTrait> FileStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self {
            conn,
            limits: BatchLimits::for_backend(conn.get_database_backend()),
        }
    }

    pub fn with_limits(conn: &'a C, limits: BatchLimits) -> Self {
        Self { conn, limits }
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    pub async fn create_folder(
        &self,
        owner_id: i32,
        parent_id: Option<i32>,
        name: &str,
    ) -> Result<file::Model, StoreError> {
        self.create_file(CreateFileParams {
            owner_id,
            parent_id,
            name: name.to_string(),
            file_type: FileType::Folder,
            size: 0,
            storage_policy_id: None,
        })
        .await
    }

    /// Insert a new namespace node. A sibling with the same name is a conflict.
    pub async fn create_file(&self, params: CreateFileParams) -> Result<file::Model, StoreError> {
        validate_name(&params.name)?;
        if let Some(parent_id) = params.parent_id {
            self.require_folder(parent_id, params.owner_id).await?;
        }
        self.ensure_name_free(params.owner_id, params.parent_id, &params.name, None)
            .await?;

        let now = Utc::now();
        let model = file::ActiveModel {
            owner_id: Set(params.owner_id),
            parent_id: Set(params.parent_id),
            name: Set(params.name),
            file_type: Set(params.file_type),
            size: Set(if params.file_type == FileType::Folder {
                0
            } else {
                params.size
            }),
            primary_entity_id: Set(None),
            storage_policy_id: Set(params.storage_policy_id),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        Ok(model.insert(self.conn).await?)
    }

    pub async fn get_file(&self, id: i32) -> Result<file::Model, StoreError> {
        file::Entity::find_by_id(id)
            .one(self.conn)
            .await?
            .ok_or_else(|| StoreError::not_found("file", id))
    }

    /// Load many files; ids that do not resolve are left out.
    pub async fn get_files(&self, ids: &[i32]) -> Result<Vec<file::Model>, StoreError> {
        let mut files = Vec::with_capacity(ids.len());
        for predicate in self.limits.predicates(1, file::Column::Id, ids) {
            files.extend(
                file::Entity::find()
                    .filter(predicate)
                    .order_by_asc(file::Column::Id)
                    .all(self.conn)
                    .await?,
            );
        }
        Ok(files)
    }

    /// Direct children of a folder (or the owner's root), soft-deleted ones excluded.
    pub async fn children(
        &self,
        owner_id: i32,
        parent_id: Option<i32>,
    ) -> Result<Vec<file::Model>, StoreError> {
        Ok(file::Entity::find()
            .filter(file::Column::OwnerId.eq(owner_id))
            .filter(parent_condition(parent_id))
            .filter(file::Column::DeletedAt.is_null())
            .order_by_asc(file::Column::Name)
            .all(self.conn)
            .await?)
    }

    pub async fn rename(&self, file: &file::Model, name: &str) -> Result<file::Model, StoreError> {
        validate_name(name)?;
        self.ensure_name_free(file.owner_id, file.parent_id, name, Some(file.id))
            .await?;

        let model = file::ActiveModel {
            id: Set(file.id),
            name: Set(name.to_string()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        Ok(model.update(self.conn).await?)
    }

    /// Re-parent files under `parent_id` (or the owner's root).
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn move_files(
        &self,
        files: &[file::Model],
        parent_id: Option<i32>,
    ) -> Result<Vec<file::Model>, StoreError> {
        let mut moved = Vec::with_capacity(files.len());
        for f in files {
            if let Some(parent_id) = parent_id {
                if parent_id == f.id {
                    return Err(ValidationError::InvalidName(format!(
                        "cannot move '{}' into itself",
                        f.name
                    ))
                    .into());
                }
                self.require_folder(parent_id, f.owner_id).await?;
            }
            self.ensure_name_free(f.owner_id, parent_id, &f.name, Some(f.id))
                .await?;

            let model = file::ActiveModel {
                id: Set(f.id),
                parent_id: Set(parent_id),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            moved.push(model.update(self.conn).await?);
        }
        Ok(moved)
    }

    /// Mark files deleted without touching their entities.
    pub async fn soft_delete(&self, ids: &[i32]) -> Result<u64, StoreError> {
        self.set_deleted_at(ids, Some(Utc::now())).await
    }

    pub async fn restore(&self, ids: &[i32]) -> Result<u64, StoreError> {
        self.set_deleted_at(ids, None).await
    }

    async fn set_deleted_at(
        &self,
        ids: &[i32],
        at: Option<chrono::DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let mut affected = 0;
        for predicate in self.limits.predicates(1, file::Column::Id, ids) {
            let res = file::Entity::update_many()
                .set(file::ActiveModel {
                    deleted_at: Set(at),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                })
                .filter(predicate)
                .exec(self.conn)
                .await?;
            affected += res.rows_affected;
        }
        Ok(affected)
    }

    /// Insert or overwrite one metadata key of a file.
    pub async fn set_metadata(
        &self,
        file_id: i32,
        name: &str,
        value: &str,
        is_public: bool,
    ) -> Result<metadata::Model, StoreError> {
        let existing = metadata::Entity::find()
            .filter(metadata::Column::FileId.eq(file_id))
            .filter(metadata::Column::Name.eq(name))
            .one(self.conn)
            .await?;

        let model = match existing {
            Some(row) => {
                let mut active: metadata::ActiveModel = row.into();
                active.value = Set(value.to_string());
                active.is_public = Set(is_public);
                active.update(self.conn).await?
            }
            None => {
                metadata::ActiveModel {
                    file_id: Set(file_id),
                    name: Set(name.to_string()),
                    value: Set(value.to_string()),
                    is_public: Set(is_public),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(self.conn)
                .await?
            }
        };
        Ok(model)
    }

    /// Metadata of a file keyed by name.
    pub async fn metadata(&self, file_id: i32) -> Result<HashMap<String, String>, StoreError> {
        Ok(metadata::Entity::find()
            .filter(metadata::Column::FileId.eq(file_id))
            .all(self.conn)
            .await?
            .into_iter()
            .map(|m| (m.name, m.value))
            .collect())
    }

    pub async fn create_share(
        &self,
        file: &file::Model,
        owner_id: i32,
    ) -> Result<share::Model, StoreError> {
        Ok(share::ActiveModel {
            file_id: Set(file.id),
            owner_id: Set(owner_id),
            views: Set(0),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn)
        .await?)
    }

    pub async fn create_direct_link(
        &self,
        file: &file::Model,
        name: &str,
    ) -> Result<direct_link::Model, StoreError> {
        Ok(direct_link::ActiveModel {
            file_id: Set(file.id),
            name: Set(name.to_string()),
            downloads: Set(0),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn)
        .await?)
    }

    async fn require_folder(&self, id: i32, owner_id: i32) -> Result<file::Model, StoreError> {
        let folder = self.get_file(id).await?;
        if folder.owner_id != owner_id || !folder.is_folder() {
            return Err(StoreError::not_found("folder", id));
        }
        Ok(folder)
    }

    async fn ensure_name_free(
        &self,
        owner_id: i32,
        parent_id: Option<i32>,
        name: &str,
        except: Option<i32>,
    ) -> Result<(), StoreError> {
        let mut query = file::Entity::find()
            .filter(file::Column::OwnerId.eq(owner_id))
            .filter(parent_condition(parent_id))
            .filter(file::Column::Name.eq(name));
        if let Some(id) = except {
            query = query.filter(file::Column::Id.ne(id));
        }

        if query.one(self.conn).await?.is_some() {
            return Err(StoreError::Conflict(format!(
                "'{name}' already exists in this folder"
            )));
        }
        Ok(())
    }

    /// Every `(file_id, entity)` attachment of the given files, newest entity first.
    async fn attachments(&self, file_ids: &[i32]) -> Result<Vec<(i32, blob::Model)>, StoreError> {
        let mut links = Vec::new();
        for predicate in self.limits.predicates(1, file_blob::Column::FileId, file_ids) {
            links.extend(
                file_blob::Entity::find()
                    .filter(predicate)
                    .all(self.conn)
                    .await?,
            );
        }

        let mut entity_ids: Vec<i32> = links.iter().map(|l| l.entity_id).collect();
        entity_ids.sort_unstable();
        entity_ids.dedup();

        let mut entities: HashMap<i32, blob::Model> = HashMap::with_capacity(entity_ids.len());
        for predicate in self.limits.predicates(1, blob::Column::Id, &entity_ids) {
            for entity in blob::Entity::find()
                .filter(predicate)
                .all(self.conn)
                .await?
            {
                entities.insert(entity.id, entity);
            }
        }

        let mut attached: Vec<(i32, blob::Model)> = links
            .into_iter()
            .filter_map(|l| entities.get(&l.entity_id).map(|e| (l.file_id, e.clone())))
            .collect();
        attached.sort_by(|a, b| b.1.id.cmp(&a.1.id));
        Ok(attached)
    }
}

fn parent_condition(parent_id: Option<i32>) -> Condition {
    match parent_id {
        Some(id) => Condition::all().add(file::Column::ParentId.eq(id)),
        None => Condition::all().add(file::Column::ParentId.is_null()),
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}
