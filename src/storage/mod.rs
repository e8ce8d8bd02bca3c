//! Authoritative blob storage with a content-addressable layout.
//!
//! Storage holds the origin bytes of every asset and, optionally, persisted
//! derivatives. Unlike the cache tier it is a source of truth: read failures
//! on a required path are fatal to the operation that needed them.
//!
//! Two backends ship behind the [`BlobStore`] trait, the local filesystem
//! and S3-compatible object storage, both using the same layout (see
//! [`layout`]), so the orchestrator never knows which one it is talking to.
//! The backend is selected once at startup from a configuration string.

use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

mod fs;
pub mod layout;
mod s3;

pub use fs::FsBlobStore;
pub use s3::{create_s3_client, S3BlobStore};

/// Authoritative storage for origin and derivative blobs, keyed by
/// (fingerprint, variant key, origin flag).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist a blob at its derived location, overwriting any previous bytes.
    async fn put(
        &self,
        fingerprint: &str,
        variant_key: &str,
        is_origin: bool,
        data: &[u8],
    ) -> Result<(), StorageError>;

    /// Fetch a blob; `StorageError::NotFound` when nothing is stored there.
    async fn get(
        &self,
        fingerprint: &str,
        variant_key: &str,
        is_origin: bool,
    ) -> Result<Bytes, StorageError>;

    /// Remove every blob stored for a fingerprint (origin and all
    /// derivatives); `StorageError::NotFound` when none exist.
    async fn delete(&self, fingerprint: &str) -> Result<(), StorageError>;
}

/// Closed set of storage backends selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Local filesystem under a root directory
    Fs,
    /// S3-compatible object storage
    S3,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fs" | "file" => Ok(StorageBackend::Fs),
            "s3" => Ok(StorageBackend::S3),
            other => Err(format!("unsupported storage backend: {}", other)),
        }
    }
}
