use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Moves raw bytes in and out of one storage backend.
///
/// Sources are opaque, backend-specific locators produced by a
/// [`SourceNamer`](super::naming::SourceNamer).
#[async_trait]
pub trait ByteMover: Send + Sync {
    /// Open a streaming reader over a stored object.
    async fn get(&self, source: &str) -> Result<BoxReader, StorageError>;

    /// Retrieve all bytes of a stored object.
    async fn get_bytes(&self, source: &str) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.get(source).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Write exactly `size` bytes from `reader` to `destination`.
    ///
    /// Fails with [`StorageError::AlreadyExists`] rather than replacing an
    /// existing object.
    async fn put(
        &self,
        reader: BoxReader,
        destination: &str,
        size: u64,
    ) -> Result<(), StorageError>;

    /// Delete objects in bulk.
    ///
    /// Returns the sources that could not be deleted. Objects that are
    /// already missing count as deleted.
    async fn delete(&self, sources: &[String]) -> Result<Vec<String>, StorageError>;
}
