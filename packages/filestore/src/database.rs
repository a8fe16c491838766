use std::time::Duration;

use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::entity::{blob, file, metadata};

pub async fn init_db(db_url: &str, max_connections: u32) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    opt.max_connections(max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    sync_schema(&db).await?;

    Ok(db)
}

/// Create or migrate every table of the `entity` module.
pub async fn sync_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.get_schema_registry("filestore::entity::*")
        .sync(db)
        .await
}

/// Ensure the composite unique indexes exist.
///
/// SeaORM's schema-sync only expresses single-column uniqueness, so the
/// multi-column keys are created here on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Sibling names are unique per owner.
    let files_name = Index::create()
        .if_not_exists()
        .unique()
        .name("uq_files_owner_parent_name")
        .table(file::Entity)
        .col(file::Column::OwnerId)
        .col(file::Column::ParentId)
        .col(file::Column::Name)
        .to_owned();

    // Content-addressable reuse: one entity per (policy, source).
    let entities_source = Index::create()
        .if_not_exists()
        .unique()
        .name("uq_entities_policy_source")
        .table(blob::Entity)
        .col(blob::Column::StoragePolicyId)
        .col(blob::Column::Source)
        .to_owned();

    let metadata_name = Index::create()
        .if_not_exists()
        .unique()
        .name("uq_metadata_file_name")
        .table(metadata::Entity)
        .col(metadata::Column::FileId)
        .col(metadata::Column::Name)
        .to_owned();

    // Stale-entity sweep: WHERE reference_count <= 0
    let entities_refs = Index::create()
        .if_not_exists()
        .name("idx_entities_reference_count")
        .table(blob::Entity)
        .col(blob::Column::ReferenceCount)
        .to_owned();

    for (name, stmt) in [
        ("uq_files_owner_parent_name", files_name),
        ("uq_entities_policy_source", entities_source),
        ("uq_metadata_file_name", metadata_name),
        ("idx_entities_reference_count", entities_refs),
    ] {
        create_index(db, name, &stmt).await?;
    }

    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    name: &str,
    stmt: &IndexCreateStatement,
) -> Result<(), DbErr> {
    let statement = db.get_database_backend().build(stmt);
    match db.execute_raw(statement).await {
        Ok(_) => {
            info!("Ensured index {} exists", name);
            Ok(())
        }
        Err(e) if name.starts_with("uq_") => Err(e),
        Err(e) => {
            warn!("Failed to create index {}: {}", name, e);
            Ok(())
        }
    }
}
