use common::FileType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A node in an owner's namespace: a folder, or a file backed by entities.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub owner_id: i32,

    /// NULL for nodes at the owner's root.
    pub parent_id: Option<i32>,

    /// Unique among siblings of the same owner.
    pub name: String,

    pub file_type: FileType,

    /// Declared size while importing; afterwards the primary entity's size.
    pub size: i64,

    pub primary_entity_id: Option<i32>,

    /// Policy new content of this file is written to.
    pub storage_policy_id: Option<i32>,

    #[sea_orm(has_many, via = "file_blob")]
    pub entities: HasMany<super::blob::Entity>,

    #[sea_orm(has_many)]
    pub metadata: HasMany<super::metadata::Entity>,

    #[sea_orm(has_many)]
    pub shares: HasMany<super::share::Entity>,

    #[sea_orm(has_many)]
    pub direct_links: HasMany<super::direct_link::Entity>,

    /// Soft-delete marker.
    pub deleted_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn is_folder(&self) -> bool {
        self.file_type == FileType::Folder
    }
}

impl ActiveModelBehavior for ActiveModel {}
