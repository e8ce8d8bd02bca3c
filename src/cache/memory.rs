//! In-process LRU cache bounded by total byte size.
//!
//! The reference [`CacheStore`] implementation: a recency-ordered map with a
//! byte budget. Eviction is driven by aggregate size, not entry count: after
//! every put, least-recently-used entries are dropped until the budget holds
//! again, so one oversized insert may evict many entries (or every entry,
//! itself included).
//!
//! All operations serialize under one exclusive lock per instance. That is
//! deliberate: each operation is an in-memory byte copy, never blocking I/O,
//! so finer locking buys nothing.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::error::CacheError;

use super::CacheStore;

/// Default byte budget: 100MB.
pub const DEFAULT_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Default maximum number of entries (bounds LRU bookkeeping).
const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct Inner {
    entries: LruCache<String, Bytes>,
    size: usize,
}

/// Byte-bounded in-memory LRU cache.
pub struct MemoryCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl MemoryCache {
    /// Create a cache with the default budget (100MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache with the given byte budget.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_entries(capacity, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with the given byte budget and entry bound.
    pub fn with_capacity_and_entries(capacity: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries.max(1)).unwrap();
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(max_entries),
                size: 0,
            }),
            capacity,
        }
    }

    /// Current aggregate size of cached values in bytes.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.size
    }

    /// Current number of cached entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// The configured byte budget.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a key is cached, without promoting it.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.lock().await.entries.contains(key)
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.size = 0;
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;

        inner.size += data.len();
        // push returns the displaced entry: the old value on key replacement,
        // or the LRU entry when the recency list is at its entry bound
        if let Some((_, displaced)) = inner.entries.push(key.to_string(), data) {
            inner.size = inner.size.saturating_sub(displaced.len());
        }

        while inner.size > self.capacity {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.size = inner.size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        let mut inner = self.inner.lock().await;
        // LruCache::get promotes the entry to most-recently-used
        inner
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::Miss(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        match inner.entries.pop(key) {
            Some(data) => {
                inner.size = inner.size.saturating_sub(data.len());
                Ok(())
            }
            None => Err(CacheError::Miss(key.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
