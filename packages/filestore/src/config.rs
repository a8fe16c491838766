use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::{BatchConfig, LocalStorageConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    /// Connection pool size. Default: 10.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// File store application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub storage: LocalStorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("FILESTORE_CONFIG").unwrap_or_else(|_| "config/filestore".to_string());

        let s = Config::builder()
            .set_default("database.max_connections", 10_i64)?
            .set_default("batch.margin", 10_i64)?
            .set_default("storage.local_root", "./data/uploads")?
            .add_source(File::with_name(&config_path).required(false))
            // Override from environment (e.g., FILESTORE__DATABASE__URL)
            .add_source(Environment::with_prefix("FILESTORE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
