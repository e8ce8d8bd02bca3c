//! # rimg
//!
//! An image rendition server: originals are uploaded once, fingerprinted by
//! content, and served back as derived renditions (scaled, cropped, rotated,
//! watermarked, reformatted) over HTTP.
//!
//! ## Features
//!
//! - **Deterministic variant keys**: identical transform parameters always
//!   resolve to the same rendition identifier
//! - **Tiered resolution**: cache → persisted derivative → origin + transform,
//!   with write-back along the way
//! - **Byte-bounded LRU cache**: eviction driven by a byte budget, not entry
//!   count; the cache is best-effort and never a source of truth
//! - **Content-addressable storage**: all variants of an asset colocate under
//!   a sharded directory for atomic whole-asset deletion, on the local
//!   filesystem or S3-compatible object storage
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`request`] - Request specs, fingerprints, and variant-key derivation
//! - [`transform`] - Geometry resolution and the transform engine seam
//! - [`cache`] - Cache tier with the in-memory LRU reference backend
//! - [`storage`] - Authoritative blob storage (filesystem, S3)
//! - [`service`] - The Save/Get/Info/Delete pipeline orchestrator
//! - [`server`] - Axum HTTP adapter
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rimg::{FsBlobStore, ImageService, MemoryCache, RasterEngine, RequestSpec};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = ImageService::new(
//!         Arc::new(FsBlobStore::new("rimg-data")),
//!         Arc::new(RasterEngine::new()),
//!     )
//!     .with_cache(Arc::new(MemoryCache::new()));
//!
//!     let descriptor = service.save_image(&[/* image bytes */]).await.unwrap();
//!     let spec = RequestSpec::origin(&descriptor.fingerprint);
//!     let original = service.get_image(&spec).await.unwrap();
//!     assert_eq!(original.len(), descriptor.size);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod request;
pub mod server;
pub mod service;
pub mod storage;
pub mod transform;

// Re-export commonly used types
pub use cache::{CacheBackend, CacheStore, MemoryCache, DEFAULT_CACHE_CAPACITY};
pub use config::Config;
pub use error::{CacheError, EngineError, ServiceError, StorageError};
pub use request::{
    fingerprint, is_valid_fingerprint, Gravity, LogoOverlay, OffsetCorner, RequestSpec, ScaleMode,
    TextOverlay, FINGERPRINT_LEN,
};
pub use server::{create_router, AppState, RouterConfig};
pub use service::{ImageDescriptor, ImageService, DEFAULT_CACHEABLE_CEILING};
pub use storage::{
    create_s3_client, BlobStore, FsBlobStore, S3BlobStore, StorageBackend,
};
pub use transform::{
    resolve_crop, resolve_scale, CropParams, CropRect, ImageInfo, RasterEngine, ScaleParams,
    TransformEngine, DEFAULT_QUALITY,
};
