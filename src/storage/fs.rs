//! Filesystem blob storage.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::StorageError;

use super::layout;
use super::BlobStore;

/// Blob storage rooted at a local directory.
///
/// Blobs are plain files under the content-addressable layout; deleting an
/// asset removes its whole directory, taking origin and every derivative
/// with it.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first put.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_file(&self, fingerprint: &str, variant_key: &str, is_origin: bool) -> PathBuf {
        self.root
            .join(layout::blob_path(fingerprint, variant_key, is_origin))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        fingerprint: &str,
        variant_key: &str,
        is_origin: bool,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let file = self.blob_file(fingerprint, variant_key, is_origin);
        let dir = file.parent().unwrap_or_else(|| self.root.as_path());

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::Backend(format!("mkdir {}: {}", dir.display(), e)))?;
        tokio::fs::write(&file, data)
            .await
            .map_err(|e| StorageError::Backend(format!("write {}: {}", file.display(), e)))?;

        debug!(file = %file.display(), size = data.len(), "stored blob");
        Ok(())
    }

    async fn get(
        &self,
        fingerprint: &str,
        variant_key: &str,
        is_origin: bool,
    ) -> Result<Bytes, StorageError> {
        let file = self.blob_file(fingerprint, variant_key, is_origin);

        match tokio::fs::read(&file).await {
            Ok(data) => {
                debug!(file = %file.display(), size = data.len(), "read blob");
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(file.display().to_string()))
            }
            Err(e) => Err(StorageError::Backend(format!(
                "read {}: {}",
                file.display(),
                e
            ))),
        }
    }

    async fn delete(&self, fingerprint: &str) -> Result<(), StorageError> {
        let dir = self.root.join(layout::asset_dir(fingerprint));

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(dir = %dir.display(), "deleted asset");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(dir.display().to_string()))
            }
            Err(e) => Err(StorageError::Backend(format!(
                "remove {}: {}",
                dir.display(),
                e
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
