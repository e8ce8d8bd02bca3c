//! Cache tier: a bounded, best-effort accelerator in front of blob storage.
//!
//! Any key→opaque-bytes store can back this tier by implementing
//! [`CacheStore`]; the in-process [`MemoryCache`] is the reference
//! implementation, and networked key-value caches plug in behind the same
//! trait. The backend is selected once at startup from a configuration
//! string; there is no per-call dispatch on backend names.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CacheError;

mod memory;

pub use memory::{MemoryCache, DEFAULT_CACHE_CAPACITY};

/// A key→bytes cache.
///
/// Failures from this tier are never fatal to a pipeline; the orchestrator
/// logs them and falls through to authoritative storage.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store bytes under a key, evicting as the backend sees fit.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), CacheError>;

    /// Fetch the bytes for a key; `CacheError::Miss` when absent.
    async fn get(&self, key: &str) -> Result<Bytes, CacheError>;

    /// Remove a key; `CacheError::Miss` when absent.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Closed set of cache backends selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// Caching disabled; every lookup falls through to storage
    None,
    /// In-process byte-bounded LRU
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CacheBackend::None),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(format!("unsupported cache backend: {}", other)),
        }
    }
}

impl CacheBackend {
    /// Construct the selected backend, or `None` when caching is disabled.
    pub fn build(self, capacity: usize, max_entries: usize) -> Option<Arc<dyn CacheStore>> {
        match self {
            CacheBackend::None => None,
            CacheBackend::Memory => Some(Arc::new(MemoryCache::with_capacity_and_entries(
                capacity,
                max_entries,
            ))),
        }
    }
}
