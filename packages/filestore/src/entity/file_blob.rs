use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Attachment edge between a file and an entity.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_entities")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub file_id: i32,
    #[sea_orm(primary_key)]
    pub entity_id: i32,
    #[sea_orm(belongs_to, from = "file_id", to = "id")]
    pub file: HasOne<super::file::Entity>,
    #[sea_orm(belongs_to, from = "entity_id", to = "id")]
    pub blob: HasOne<super::blob::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
