use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use super::error::StorageError;
use super::traits::{BoxReader, ByteMover};

/// Local-disk byte-mover.
///
/// Sources are relative paths resolved under `base_path`. Writes land in
/// `{base_path}/.tmp` first and are linked into place once the declared
/// size has been verified.
pub struct LocalMover {
    base_path: PathBuf,
}

impl LocalMover {
    /// Create a new local mover, creating the base and temp directories.
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a source locator onto a path under the base directory.
    ///
    /// Absolute paths and parent components are rejected.
    pub fn resolve(&self, source: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(source);
        if source.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::InvalidSource(source.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl ByteMover for LocalMover {
    async fn get(&self, source: &str) -> Result<BoxReader, StorageError> {
        let path = self.resolve(source)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(source.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        mut reader: BoxReader,
        destination: &str,
        size: u64,
    ) -> Result<(), StorageError> {
        let target = self.resolve(destination)?;
        let temp_path = self.temp_path();
        let mut temp_file = fs::File::create(&temp_path).await?;
        let mut total_bytes: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    drop(temp_file);
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > size {
                break;
            }

            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        drop(temp_file);

        if total_bytes != size {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::SizeMismatch {
                source_path: destination.to_string(),
                expected: size,
                actual: total_bytes,
            });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        // hard_link fails on an existing target, so a concurrent writer can
        // not be overwritten between a check and the rename.
        let linked = fs::hard_link(&temp_path, &target).await;
        let _ = fs::remove_file(&temp_path).await;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(destination.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, sources: &[String]) -> Result<Vec<String>, StorageError> {
        let mut failed = Vec::new();
        for source in sources {
            let path = match self.resolve(source) {
                Ok(path) => path,
                Err(e) => {
                    warn!(source = %source, error = %e, "Refusing to delete invalid source");
                    failed.push(source.clone());
                    continue;
                }
            };

            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(source = %source, error = %e, "Failed to delete local object");
                    failed.push(source.clone());
                }
            }
        }
        Ok(failed)
    }
}
