use thiserror::Error;

/// Errors raised by byte-movers while reading, writing or deleting objects.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested object does not exist on the backend.
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The source locator cannot be mapped onto this backend.
    #[error("invalid source path: {0}")]
    InvalidSource(String),
    /// Fewer or more bytes arrived than the caller declared.
    #[error("size mismatch writing {source_path} ({actual} != {expected} bytes)")]
    SizeMismatch {
        source_path: String,
        expected: u64,
        actual: u64,
    },
    /// Writes never replace an existing object.
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    /// The backend refused the operation for a reason of its own.
    #[error("backend error: {0}")]
    Backend(String),
}
