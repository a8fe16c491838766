use serde::Deserialize;

/// Query parameter budget used when splitting large id lists into batches.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum bind parameters per statement. Default: derived from the database backend.
    #[serde(default)]
    pub max_params: Option<usize>,
    /// Parameters reserved for the non-id parts of a statement. Default: 10.
    #[serde(default = "default_batch_margin")]
    pub margin: usize,
}

fn default_batch_margin() -> usize {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_params: None,
            margin: default_batch_margin(),
        }
    }
}

/// Local disk byte-mover configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LocalStorageConfig {
    /// Directory every local policy's sources are resolved against. Default: "./data/uploads".
    #[serde(default = "default_local_root")]
    pub local_root: String,
}

fn default_local_root() -> String {
    "./data/uploads".into()
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            local_root: default_local_root(),
        }
    }
}
