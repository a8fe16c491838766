use anyhow::Context;
use common::storage::LocalMover;
use filestore::batch::BatchLimits;
use filestore::config::AppConfig;
use filestore::database::{ensure_indexes, init_db};
use filestore::quota::recalculate_all;
use filestore::store::FileStore;
use sea_orm::ConnectionTrait;
use tracing::{info, warn};

/// Maintenance entry point: bring the schema up to date and reconcile
/// every owner's storage usage with the entities actually attached.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load config")?;
    let db = init_db(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;
    ensure_indexes(&db)
        .await
        .context("Failed to create indexes")?;
    info!("Database ready");

    let local = LocalMover::new(&config.storage.local_root)
        .await
        .context("Failed to prepare local storage root")?;
    info!(root = %local.base_path().display(), "Local storage ready");

    let corrected = recalculate_all(&db)
        .await
        .context("Failed to recalculate storage usage")?;
    for (owner_id, stored, recomputed) in &corrected {
        warn!(owner_id, stored, recomputed, "Corrected storage usage");
    }

    let limits = BatchLimits::from_config(&config.batch, db.get_database_backend());
    let stale = FileStore::with_limits(&db, limits)
        .stale_entities(1000)
        .await
        .context("Failed to list stale entities")?;
    info!(
        corrected = corrected.len(),
        stale = stale.len(),
        "Storage reconciliation finished"
    );

    Ok(())
}
