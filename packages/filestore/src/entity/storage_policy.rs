use common::{PolicyFlags, PolicyType};
use common::storage::NamingRules;
use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-backend settings kept as JSON next to the typed columns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct PolicySettings {
    /// Upload chunk size in bytes; 0 means single-part uploads.
    #[serde(default)]
    pub chunk_size: i64,
    /// Extensions the backend can thumbnail natively.
    #[serde(default)]
    pub thumbnail_exts: Vec<String>,
    /// Lowercase extensions without the dot; empty allows everything.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

/// One configured storage backend instance.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "storage_policies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,

    pub policy_type: PolicyType,

    /// Endpoint or node address for non-local backends.
    pub server: Option<String>,
    pub bucket_name: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,

    /// Largest accepted entity in bytes; 0 means unlimited.
    #[sea_orm(default_value = 0)]
    pub max_size: i64,

    pub dir_name_rule: String,
    pub file_name_rule: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub settings: PolicySettings,

    /// Bits of [`PolicyFlags`].
    #[sea_orm(default_value = 0)]
    pub flags: i64,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn flags(&self) -> PolicyFlags {
        PolicyFlags::from_column(self.flags)
    }

    pub fn naming_rules(&self) -> NamingRules<'_> {
        NamingRules {
            dir_rule: &self.dir_name_rule,
            file_rule: &self.file_name_rule,
        }
    }
}

impl ActiveModelBehavior for ActiveModel {}
