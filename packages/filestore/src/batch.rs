use common::config::BatchConfig;
use sea_orm::{ColumnTrait, Condition, DbBackend, Value};

/// Bind-parameter ceiling of a backend plus the share reserved for the rest
/// of each statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_params: usize,
    pub margin: usize,
}

impl BatchLimits {
    pub fn new(max_params: usize, margin: usize) -> Self {
        Self { max_params, margin }
    }

    /// Limits matching the backend's documented bind-parameter maximum.
    pub fn for_backend(backend: DbBackend) -> Self {
        let max_params = match backend {
            DbBackend::Sqlite => 32766,
            _ => 65535,
        };
        Self::new(max_params, 10)
    }

    /// Configured limits, falling back to the backend default.
    pub fn from_config(config: &BatchConfig, backend: DbBackend) -> Self {
        let default = Self::for_backend(backend);
        Self::new(config.max_params.unwrap_or(default.max_params), config.margin)
    }

    /// Ids per chunk when each id costs `multiplier` parameters. Never below one.
    pub fn chunk_size(&self, multiplier: usize) -> usize {
        (self.max_params.saturating_sub(self.margin) / multiplier.max(1)).max(1)
    }

    /// Split `keys` into ordered, non-empty chunks of at most [`chunk_size`](Self::chunk_size).
    pub fn chunks<'k, K>(&self, multiplier: usize, keys: &'k [K]) -> std::slice::Chunks<'k, K> {
        keys.chunks(self.chunk_size(multiplier))
    }

    /// One `column IN (...)` predicate per chunk. Empty input yields no predicates.
    pub fn predicates<C, K>(&self, multiplier: usize, column: C, keys: &[K]) -> Vec<Condition>
    where
        C: ColumnTrait,
        K: Into<Value> + Clone,
    {
        self.chunks(multiplier, keys)
            .map(|chunk| Condition::all().add(column.is_in(chunk.iter().cloned())))
            .collect()
    }
}
