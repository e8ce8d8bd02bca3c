//! The rendition pipeline orchestrator.
//!
//! [`ImageService`] composes the cache tier, authoritative storage, and the
//! transform engine into four stateless operations:
//!
//! - **save**: fingerprint the upload, persist the origin, warm the cache,
//!   describe the image.
//! - **get**: resolve a rendition through the tiers
//!   (cache, then persisted derivative, then origin + transform), writing
//!   results back on the way out.
//! - **info**: resolve bytes like `get` but without transforming on a miss,
//!   then describe them.
//! - **delete**: drop the cached origin and every stored blob of the asset.
//!
//! # Failure policy
//!
//! The cache is a pure accelerator: every cache failure is logged and
//! swallowed. Storage reads on a required path and engine failures are fatal.
//! Storage writes for derivative persistence are best-effort. Callers see one
//! success or failure per operation; tier fallbacks surface only as latency.
//!
//! Concurrent requests for the same variant are not deduplicated: each
//! transforms independently and last-write-wins, which is safe because
//! outputs are pure functions of inputs.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::error::ServiceError;
use crate::request::{fingerprint, is_valid_fingerprint, RequestSpec};
use crate::storage::BlobStore;
use crate::transform::{ImageInfo, TransformEngine};

/// Default ceiling on the size of a single cached object: 1MB.
pub const DEFAULT_CACHEABLE_CEILING: usize = 1024 * 1024;

// =============================================================================
// Response descriptor
// =============================================================================

/// Description of a stored image, returned by save and info.
#[derive(Debug, Clone, Serialize)]
pub struct ImageDescriptor {
    /// Content fingerprint of the asset
    pub fingerprint: String,

    /// Public URL of the asset, when a base URL is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Variant key of the described rendition
    pub variant_key: String,

    /// Encoded size in bytes
    pub size: usize,

    /// Pixel width
    pub width: u32,

    /// Pixel height
    pub height: u32,

    /// Lowercase format name
    pub format: String,

    /// EXIF-style orientation name
    pub orientation: String,

    /// Decoder-provided metadata
    pub metadata: HashMap<String, String>,
}

// =============================================================================
// Image service
// =============================================================================

/// Stateless orchestrator over cache, storage, and the transform engine.
pub struct ImageService {
    storage: Arc<dyn BlobStore>,
    cache: Option<Arc<dyn CacheStore>>,
    engine: Arc<dyn TransformEngine>,
    cacheable_ceiling: usize,
    public_url: Option<String>,
}

impl ImageService {
    /// Create a service without a cache tier.
    pub fn new(storage: Arc<dyn BlobStore>, engine: Arc<dyn TransformEngine>) -> Self {
        Self {
            storage,
            cache: None,
            engine,
            cacheable_ceiling: DEFAULT_CACHEABLE_CEILING,
            public_url: None,
        }
    }

    /// Attach a cache backend.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the ceiling on the size of a single cached object.
    pub fn with_cacheable_ceiling(mut self, ceiling: usize) -> Self {
        self.cacheable_ceiling = ceiling;
        self
    }

    /// Set the public base URL used in descriptors.
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    /// Whether a cache tier is configured.
    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Persist uploaded bytes as a new origin and describe them.
    ///
    /// The origin write is fatal on failure; the cache warm-up is
    /// best-effort. The descriptor comes from the engine, so an undecodable
    /// payload fails the operation even though the bytes were stored.
    pub async fn save_image(&self, data: &[u8]) -> Result<ImageDescriptor, ServiceError> {
        let fp = fingerprint(data);
        debug!(fingerprint = %fp, size = data.len(), "save image");

        let spec = RequestSpec::origin(&fp);

        self.storage.put(&fp, "", true, data).await?;

        if self.cache_eligible(Some(data.len())) {
            self.cache_put(&spec.cache_key(), Bytes::copy_from_slice(data))
                .await;
        }

        let info = self.engine.info(data).map_err(|e| {
            warn!(fingerprint = %fp, error = %e, "describe uploaded image failed");
            e
        })?;

        Ok(self.descriptor(&spec, info))
    }

    /// Resolve the bytes of a rendition.
    ///
    /// Tier order: cache, persisted derivative, origin + transform. Results
    /// are written back to the cache (and, when the spec asks for
    /// persistence, to storage) on the way out.
    pub async fn get_image(&self, spec: &RequestSpec) -> Result<Bytes, ServiceError> {
        spec.validate()?;

        let cache_key = spec.cache_key();
        let variant_key = spec.variant_key();
        debug!(fingerprint = %spec.fingerprint, key = %cache_key, "get image");

        // 1. Cache hit returns immediately, no storage or transform work.
        if let Some(data) = self.cache_get(&cache_key).await {
            return Ok(data);
        }

        // 2. A precomputed derivative (or the origin itself) may already be
        //    persisted; a hit is written through to the cache.
        match self
            .storage
            .get(&spec.fingerprint, &variant_key, spec.origin)
            .await
        {
            Ok(data) => {
                if self.cache_eligible(Some(data.len())) {
                    self.cache_put(&cache_key, data.clone()).await;
                }
                return Ok(data);
            }
            Err(e) => {
                debug!(fingerprint = %spec.fingerprint, key = %variant_key, error = %e, "no persisted variant");
            }
        }

        // 3. Obtain the origin bytes, warming the cache when they had to come
        //    from storage. Without an origin there is nothing to transform.
        let origin_data = self.fetch_origin(&spec.fingerprint).await?;
        if spec.origin {
            return Ok(origin_data);
        }

        // 4. Transform. Engine failures are fatal.
        let derived = self.engine.convert(&origin_data, spec).map_err(|e| {
            warn!(fingerprint = %spec.fingerprint, error = %e, "transform failed");
            e
        })?;
        let derived = Bytes::from(derived);

        // 5. Best-effort write-back to the cache.
        if self.cache_eligible(Some(derived.len())) {
            self.cache_put(&cache_key, derived.clone()).await;
        }

        // 6. Best-effort persistence of the derivative when requested.
        if spec.save {
            if let Err(e) = self
                .storage
                .put(&spec.fingerprint, &variant_key, false, &derived)
                .await
            {
                warn!(fingerprint = %spec.fingerprint, key = %variant_key, error = %e, "persist derivative failed");
            }
        }

        Ok(derived)
    }

    /// Describe a rendition without transforming on a miss.
    ///
    /// Only materialized bytes are described: the cache and storage are
    /// consulted for the requested variant, and a miss at both tiers is
    /// NotFound even when the origin exists.
    pub async fn info_image(&self, spec: &RequestSpec) -> Result<ImageDescriptor, ServiceError> {
        spec.validate()?;

        let cache_key = spec.cache_key();
        let variant_key = spec.variant_key();
        debug!(fingerprint = %spec.fingerprint, key = %cache_key, "info image");

        let data = match self.cache_get(&cache_key).await {
            Some(data) => data,
            None => {
                let data = self
                    .storage
                    .get(&spec.fingerprint, &variant_key, spec.origin)
                    .await
                    .map_err(|e| {
                        warn!(fingerprint = %spec.fingerprint, key = %variant_key, error = %e, "info lookup failed");
                        ServiceError::from(e)
                    })?;
                if self.cache_eligible(Some(data.len())) {
                    self.cache_put(&cache_key, data.clone()).await;
                }
                data
            }
        };

        let info = self.engine.info(&data)?;
        Ok(self.descriptor(spec, info))
    }

    /// Remove an asset: evict the cached origin, then delete every stored
    /// blob for the fingerprint.
    ///
    /// The cache eviction is best-effort; the storage deletion is fatal on
    /// failure. Cached derivative entries are not enumerable through the
    /// cache interface and age out of the LRU instead.
    pub async fn delete_image(&self, fp: &str) -> Result<(), ServiceError> {
        if !is_valid_fingerprint(fp) {
            return Err(ServiceError::Validation(format!(
                "malformed fingerprint: {:?}",
                fp
            )));
        }
        debug!(fingerprint = %fp, "delete image");

        if let Some(cache) = &self.cache {
            // The origin cache key is the fingerprint itself
            match cache.delete(fp).await {
                Ok(()) => debug!(fingerprint = %fp, "evicted cached origin"),
                Err(e) => debug!(fingerprint = %fp, error = %e, "cached origin not evicted"),
            }
        }

        self.storage.delete(fp).await.map_err(|e| {
            warn!(fingerprint = %fp, error = %e, "delete failed");
            ServiceError::from(e)
        })
    }

    // =========================================================================
    // Tier helpers
    // =========================================================================

    /// Caching is attempted only when a backend is configured and the size,
    /// when known, fits the configured ceiling.
    fn cache_eligible(&self, size: Option<usize>) -> bool {
        self.cache.is_some() && size.map_or(true, |n| n <= self.cacheable_ceiling)
    }

    async fn cache_get(&self, key: &str) -> Option<Bytes> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(data) => {
                debug!(key = %key, size = data.len(), "cache hit");
                Some(data)
            }
            Err(e) => {
                debug!(key = %key, error = %e, "cache miss");
                None
            }
        }
    }

    async fn cache_put(&self, key: &str, data: Bytes) {
        if let Some(cache) = &self.cache {
            match cache.put(key, data).await {
                Ok(()) => debug!(key = %key, "cached"),
                Err(e) => warn!(key = %key, error = %e, "cache write failed"),
            }
        }
    }

    /// Fetch the origin bytes: cache first, storage on a miss (fatal when
    /// absent), warming the cache when storage had to serve them.
    async fn fetch_origin(&self, fp: &str) -> Result<Bytes, ServiceError> {
        let mut warm_cache = false;
        if self.cache.is_some() {
            if let Some(data) = self.cache_get(fp).await {
                return Ok(data);
            }
            warm_cache = true;
        }

        let data = self.storage.get(fp, "", true).await.map_err(|e| {
            warn!(fingerprint = %fp, error = %e, "origin unavailable");
            ServiceError::from(e)
        })?;

        if warm_cache && self.cache_eligible(Some(data.len())) {
            self.cache_put(fp, data.clone()).await;
        }

        Ok(data)
    }

    fn descriptor(&self, spec: &RequestSpec, info: ImageInfo) -> ImageDescriptor {
        let url = self.public_url.as_ref().and_then(|base| {
            url::Url::parse(base).ok().map(|mut u| {
                u.set_path(&format!("image/{}", spec.fingerprint));
                u.to_string()
            })
        });

        ImageDescriptor {
            fingerprint: spec.fingerprint.clone(),
            url,
            variant_key: spec.variant_key(),
            size: info.size,
            width: info.width,
            height: info.height,
            format: info.format,
            orientation: info.orientation,
            metadata: info.metadata,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::{EngineError, StorageError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory blob store double.
    #[derive(Default)]
    struct MemBlobStore {
        blobs: Mutex<HashMap<String, Bytes>>,
    }

    impl MemBlobStore {
        fn key(fingerprint: &str, variant_key: &str, is_origin: bool) -> String {
            crate::storage::layout::blob_path(fingerprint, variant_key, is_origin)
        }
    }

    #[async_trait]
    impl BlobStore for MemBlobStore {
        async fn put(
            &self,
            fingerprint: &str,
            variant_key: &str,
            is_origin: bool,
            data: &[u8],
        ) -> Result<(), StorageError> {
            self.blobs.lock().unwrap().insert(
                Self::key(fingerprint, variant_key, is_origin),
                Bytes::copy_from_slice(data),
            );
            Ok(())
        }

        async fn get(
            &self,
            fingerprint: &str,
            variant_key: &str,
            is_origin: bool,
        ) -> Result<Bytes, StorageError> {
            let key = Self::key(fingerprint, variant_key, is_origin);
            self.blobs
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(StorageError::NotFound(key))
        }

        async fn delete(&self, fingerprint: &str) -> Result<(), StorageError> {
            let prefix = format!("{}/", crate::storage::layout::asset_dir(fingerprint));
            let mut blobs = self.blobs.lock().unwrap();
            let keys: Vec<String> = blobs
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            if keys.is_empty() {
                return Err(StorageError::NotFound(prefix));
            }
            for key in keys {
                blobs.remove(&key);
            }
            Ok(())
        }
    }

    /// Engine double that records calls and derives deterministic output.
    #[derive(Default)]
    struct CountingEngine {
        info_calls: AtomicUsize,
        convert_calls: AtomicUsize,
    }

    impl TransformEngine for CountingEngine {
        fn info(&self, data: &[u8]) -> Result<ImageInfo, EngineError> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ImageInfo {
                width: 100,
                height: 50,
                format: "png".to_string(),
                size: data.len(),
                orientation: "TOP_LEFT".to_string(),
                metadata: HashMap::new(),
            })
        }

        fn convert(&self, data: &[u8], _spec: &RequestSpec) -> Result<Vec<u8>, EngineError> {
            self.convert_calls.fetch_add(1, Ordering::SeqCst);
            let mut out = b"derived:".to_vec();
            out.extend_from_slice(data);
            Ok(out)
        }
    }

    struct Fixture {
        service: ImageService,
        engine: Arc<CountingEngine>,
        storage: Arc<MemBlobStore>,
        cache: Arc<MemoryCache>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemBlobStore::default());
        let engine = Arc::new(CountingEngine::default());
        let cache = Arc::new(MemoryCache::with_capacity(1024 * 1024));
        let service = ImageService::new(storage.clone(), engine.clone())
            .with_cache(cache.clone())
            .with_public_url("http://localhost:8080");
        Fixture {
            service,
            engine,
            storage,
            cache,
        }
    }

    fn derivative_spec(fp: &str) -> RequestSpec {
        RequestSpec {
            fingerprint: fp.to_string(),
            scale: true,
            scale_width: 100,
            quality: 80,
            ..RequestSpec::default()
        }
    }

    #[tokio::test]
    async fn test_save_then_get_origin_round_trips() {
        let f = fixture();
        let payload = b"image payload bytes";

        let desc = f.service.save_image(payload).await.unwrap();
        assert_eq!(desc.fingerprint, fingerprint(payload));
        assert_eq!(desc.variant_key, desc.fingerprint);
        assert_eq!(desc.size, payload.len());
        assert_eq!(
            desc.url.as_deref(),
            Some(format!("http://localhost:8080/image/{}", desc.fingerprint).as_str())
        );

        let spec = RequestSpec::origin(&desc.fingerprint);
        let data = f.service.get_image(&spec).await.unwrap();
        assert_eq!(&data[..], payload);
    }

    #[tokio::test]
    async fn test_get_unknown_fingerprint_is_not_found() {
        let f = fixture();
        let spec = RequestSpec::origin(fingerprint(b"never saved"));
        assert!(matches!(
            f.service.get_image(&spec).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_derivative_miss_transforms_once_then_hits_cache() {
        let f = fixture();
        let payload = b"origin";
        let desc = f.service.save_image(payload).await.unwrap();

        let spec = derivative_spec(&desc.fingerprint);
        let first = f.service.get_image(&spec).await.unwrap();
        assert_eq!(f.engine.convert_calls.load(Ordering::SeqCst), 1);

        // Warm cache: identical bytes, zero additional engine calls
        let second = f.service.get_image(&spec).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.engine.convert_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_warm_cache_skips_engine_entirely() {
        let f = fixture();
        let desc = f.service.save_image(b"origin").await.unwrap();
        let spec = RequestSpec::origin(&desc.fingerprint);

        f.service.get_image(&spec).await.unwrap();
        assert_eq!(f.engine.convert_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_derivative_not_persisted_unless_requested() {
        let f = fixture();
        let desc = f.service.save_image(b"origin").await.unwrap();

        let spec = derivative_spec(&desc.fingerprint);
        f.service.get_image(&spec).await.unwrap();
        assert!(f
            .storage
            .get(&desc.fingerprint, &spec.variant_key(), false)
            .await
            .is_err());

        let mut saving = derivative_spec(&desc.fingerprint);
        saving.save = true;
        f.service.get_image(&saving).await.unwrap();
        assert!(f
            .storage
            .get(&desc.fingerprint, &saving.variant_key(), false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_persisted_derivative_served_without_transform() {
        let f = fixture();
        let desc = f.service.save_image(b"origin").await.unwrap();

        let mut spec = derivative_spec(&desc.fingerprint);
        spec.save = true;
        let derived = f.service.get_image(&spec).await.unwrap();
        assert_eq!(f.engine.convert_calls.load(Ordering::SeqCst), 1);

        // Fresh service sharing the same storage but a cold cache: the
        // persisted derivative short-circuits the engine.
        let cold = ImageService::new(f.storage.clone(), f.engine.clone())
            .with_cache(Arc::new(MemoryCache::with_capacity(1024 * 1024)));
        let again = cold.get_image(&spec).await.unwrap();
        assert_eq!(derived, again);
        assert_eq!(f.engine.convert_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_info_describes_materialized_bytes_only() {
        let f = fixture();
        let desc = f.service.save_image(b"origin").await.unwrap();

        // Origin info resolves
        let spec = RequestSpec::origin(&desc.fingerprint);
        let info = f.service.info_image(&spec).await.unwrap();
        assert_eq!(info.fingerprint, desc.fingerprint);

        // A never-materialized derivative is NotFound, not transformed
        let spec = derivative_spec(&desc.fingerprint);
        assert!(matches!(
            f.service.info_image(&spec).await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(f.engine.convert_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_origin_and_derivatives() {
        let f = fixture();
        let desc = f.service.save_image(b"origin").await.unwrap();

        let mut spec = derivative_spec(&desc.fingerprint);
        spec.save = true;
        f.service.get_image(&spec).await.unwrap();

        f.service.delete_image(&desc.fingerprint).await.unwrap();

        assert!(matches!(
            f.service
                .get_image(&RequestSpec::origin(&desc.fingerprint))
                .await,
            Err(ServiceError::NotFound(_))
        ));
        // Deleting again reports NotFound
        assert!(matches!(
            f.service.delete_image(&desc.fingerprint).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_evicts_cached_origin() {
        let f = fixture();
        let desc = f.service.save_image(b"origin").await.unwrap();
        assert!(f.cache.contains(&desc.fingerprint).await);

        f.service.delete_image(&desc.fingerprint).await.unwrap();
        assert!(!f.cache.contains(&desc.fingerprint).await);
    }

    #[tokio::test]
    async fn test_cacheable_ceiling_enforced_when_size_known() {
        let storage = Arc::new(MemBlobStore::default());
        let engine = Arc::new(CountingEngine::default());
        let cache = Arc::new(MemoryCache::with_capacity(1024 * 1024));
        let service = ImageService::new(storage, engine)
            .with_cache(cache.clone())
            .with_cacheable_ceiling(8);

        // 6-byte payload fits the ceiling, 30-byte payload does not
        let small = service.save_image(b"small!").await.unwrap();
        assert!(cache.contains(&small.fingerprint).await);

        let large = service
            .save_image(b"this payload exceeds the limit")
            .await
            .unwrap();
        assert!(!cache.contains(&large.fingerprint).await);
    }

    #[tokio::test]
    async fn test_cache_disabled_still_serves() {
        let storage = Arc::new(MemBlobStore::default());
        let engine = Arc::new(CountingEngine::default());
        let service = ImageService::new(storage, engine.clone());

        let desc = service.save_image(b"origin").await.unwrap();
        let spec = derivative_spec(&desc.fingerprint);

        service.get_image(&spec).await.unwrap();
        service.get_image(&spec).await.unwrap();
        // No cache: every get transforms
        assert_eq!(engine.convert_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_fingerprint_rejected() {
        let f = fixture();
        assert!(matches!(
            f.service.delete_image("nope").await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            f.service.get_image(&RequestSpec::origin("nope")).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
