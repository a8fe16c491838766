use common::EntityType;
use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Why an entity became stale, consumed by the hard-delete sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct RecycleOptions {
    /// Skip the retention window and remove the bytes on the next sweep.
    #[serde(default)]
    pub unlink_only: bool,
    /// Free-form origin of the orphaning (e.g. "delete", "relocate").
    #[serde(default)]
    pub reason: String,
}

/// One physical content blob stored under a storage policy.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "entities")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub entity_type: EntityType,

    /// Backend-specific locator of the bytes.
    pub source: String,

    pub size: i64,

    pub storage_policy_id: i32,

    pub created_by: Option<i32>,

    /// Number of logical references; at or below zero the entity is stale.
    pub reference_count: i32,

    /// Set while the entity is a placeholder for an unfinished upload.
    pub upload_session_id: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub recycle_options: Option<RecycleOptions>,

    #[sea_orm(has_many, via = "file_blob")]
    pub files: HasMany<super::file::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn is_placeholder(&self) -> bool {
        self.upload_session_id.is_some()
    }

    pub fn is_stale(&self) -> bool {
        self.reference_count <= 0
    }
}

impl ActiveModelBehavior for ActiveModel {}
