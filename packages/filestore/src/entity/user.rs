use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Owner row carrying the incrementally maintained storage usage.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,

    /// Bytes billed to this owner.
    #[sea_orm(default_value = 0)]
    pub storage: i64,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
