use std::sync::Arc;

use chrono::Utc;
use common::storage::{ByteMover, LocalMover};
use common::{EntityType, PolicyType};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use tempfile::TempDir;

use filestore::database::{ensure_indexes, sync_schema};
use filestore::entity::storage_policy::PolicySettings;
use filestore::entity::{blob, file, storage_policy, user};
use filestore::quota::UserQuota;
use filestore::store::{CreateFileParams, EntityParams, FileStore};

/// A fresh in-memory database with the schema and indexes in place.
///
/// The pool holds a single connection, so `db` must not be queried while a
/// transaction from [`filestore::Tx`] is still open.
pub struct TestStore {
    pub db: DatabaseConnection,
    pub quota: Arc<UserQuota>,
    pub dir: TempDir,
}

impl TestStore {
    pub async fn spawn() -> Self {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts)
            .await
            .expect("Failed to open in-memory database");
        sync_schema(&db).await.expect("Failed to sync schema");
        ensure_indexes(&db).await.expect("Failed to create indexes");

        Self {
            quota: Arc::new(UserQuota::new(db.clone())),
            db,
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn store(&self) -> FileStore<'_, DatabaseConnection> {
        FileStore::new(&self.db)
    }

    pub async fn create_user(&self, name: &str) -> user::Model {
        user::ActiveModel {
            name: Set(name.to_string()),
            storage: Set(0),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to create user")
    }

    pub async fn user_storage(&self, id: i32) -> i64 {
        user::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .expect("Failed to query user")
            .expect("User not found")
            .storage
    }

    pub async fn create_policy(&self, name: &str, max_size: i64) -> storage_policy::Model {
        self.create_policy_with_rule(name, max_size, "").await
    }

    /// A local policy storing objects under `{uid}/` with `file_rule` names.
    pub async fn create_policy_with_rule(
        &self,
        name: &str,
        max_size: i64,
        file_rule: &str,
    ) -> storage_policy::Model {
        storage_policy::ActiveModel {
            name: Set(name.to_string()),
            policy_type: Set(PolicyType::Local),
            server: Set(None),
            bucket_name: Set(None),
            access_key: Set(None),
            secret_key: Set(None),
            max_size: Set(max_size),
            dir_name_rule: Set("{uid}".to_string()),
            file_name_rule: Set(file_rule.to_string()),
            settings: Set(PolicySettings::default()),
            flags: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to create policy")
    }

    /// A local byte-mover rooted in its own subdirectory of the temp dir.
    pub async fn mover(&self, name: &str) -> Arc<LocalMover> {
        Arc::new(
            LocalMover::new(self.dir.path().join(name))
                .await
                .expect("Failed to create local mover"),
        )
    }

    pub async fn folder(&self, owner_id: i32, parent_id: Option<i32>, name: &str) -> file::Model {
        self.store()
            .create_folder(owner_id, parent_id, name)
            .await
            .expect("Failed to create folder")
    }

    pub async fn file(&self, owner_id: i32, parent_id: Option<i32>, name: &str) -> file::Model {
        self.store()
            .create_file(CreateFileParams {
                owner_id,
                parent_id,
                name: name.to_string(),
                file_type: common::FileType::File,
                size: 0,
                storage_policy_id: None,
            })
            .await
            .expect("Failed to create file")
    }

    /// Attach a billed, active version entity to `file`.
    pub async fn attach(&self, file: &file::Model, policy_id: i32, source: &str, size: i64) -> blob::Model {
        let (entity, _) = self
            .store()
            .create_entity(file, version(policy_id, source, size))
            .await
            .expect("Failed to create entity");
        entity
    }

    pub async fn entity(&self, id: i32) -> blob::Model {
        self.store().get_entity(id).await.expect("Entity not found")
    }

    pub async fn reload(&self, file: &file::Model) -> file::Model {
        self.store().get_file(file.id).await.expect("File not found")
    }
}

/// Billed version entity parameters with no upload session.
pub fn version(policy_id: i32, source: &str, size: i64) -> EntityParams {
    EntityParams {
        entity_type: EntityType::Version,
        source: source.to_string(),
        size,
        storage_policy_id: policy_id,
        created_by: None,
        upload_session_id: None,
        bill: true,
    }
}

/// Store `bytes` at `source` through `mover`.
pub async fn put_bytes(mover: &dyn ByteMover, source: &str, bytes: &[u8]) {
    mover
        .put(
            Box::new(std::io::Cursor::new(bytes.to_vec())),
            source,
            bytes.len() as u64,
        )
        .await
        .expect("Failed to write test object");
}
