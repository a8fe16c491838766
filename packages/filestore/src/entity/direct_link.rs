use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Public download link pinned to one file.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "direct_links")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub file_id: i32,
    #[sea_orm(belongs_to, from = "file_id", to = "id")]
    pub file: HasOne<super::file::Entity>,

    /// Name presented in the link URL.
    pub name: String,

    #[sea_orm(default_value = 0)]
    pub downloads: i32,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
