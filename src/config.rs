//! Configuration for the rimg server.
//!
//! Every option can be set on the command line or through an environment
//! variable with the `RIMG_` prefix; unset options fall back to defaults that
//! give a working single-node setup (filesystem storage, in-memory cache).
//!
//! # Environment Variables
//!
//! - `RIMG_HOST` / `RIMG_PORT` - bind address (default: 0.0.0.0:8080)
//! - `RIMG_PUBLIC_URL` - base URL advertised in image descriptors
//! - `RIMG_STORAGE` - storage backend: `fs` or `s3` (default: fs)
//! - `RIMG_STORAGE_ROOT` - root directory for the fs backend
//! - `RIMG_S3_BUCKET` / `RIMG_S3_ENDPOINT` / `RIMG_S3_REGION` - s3 backend
//! - `RIMG_SAVE_DERIVATIVES` - persist derivatives by default
//! - `RIMG_CACHE` - cache backend: `memory` or `none` (default: memory)
//! - `RIMG_CACHE_CAPACITY` - cache byte budget (default: 100MB)
//! - `RIMG_CACHE_MAX_OBJECT_SIZE` - per-object cacheable-size ceiling
//! - `RIMG_FORMAT` / `RIMG_QUALITY` - default output format and quality
//! - `RIMG_ALLOWED_TYPES` - accepted upload formats (comma-separated)
//! - `RIMG_LOGO_DIR` - directory holding logo overlay sources
//! - `RIMG_MAX_UPLOAD` - upload size cap in bytes
//! - `RIMG_ETAG` / `RIMG_MAX_AGE` - HTTP caching headers
//! - `RIMG_CORS_ORIGINS` - allowed CORS origins (comma-separated)

use clap::Parser;

use crate::cache::{CacheBackend, DEFAULT_CACHE_CAPACITY};
use crate::service::DEFAULT_CACHEABLE_CEILING;
use crate::storage::StorageBackend;
use crate::transform::DEFAULT_QUALITY;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default AWS region for the s3 backend.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default root directory for the fs backend.
pub const DEFAULT_STORAGE_ROOT: &str = "rimg-data";

/// Default maximum number of cache entries.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// Default upload size cap: 100MB.
pub const DEFAULT_MAX_UPLOAD: usize = 100 * 1024 * 1024;

/// Default HTTP Cache-Control max-age: 90 days.
pub const DEFAULT_MAX_AGE: u32 = 90 * 24 * 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// rimg - an image rendition server.
///
/// Upload originals once, then request renditions by transform parameters;
/// repeat requests are served from cache or persisted derivatives.
#[derive(Parser, Debug, Clone)]
#[command(name = "rimg")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "RIMG_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "RIMG_PORT")]
    pub port: u16,

    /// Public base URL advertised in image descriptors (e.g. behind a proxy).
    #[arg(long, env = "RIMG_PUBLIC_URL")]
    pub public_url: Option<String>,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Storage backend: "fs" or "s3".
    #[arg(long, default_value = "fs", env = "RIMG_STORAGE")]
    pub storage: String,

    /// Root directory for the fs backend.
    #[arg(long, default_value = DEFAULT_STORAGE_ROOT, env = "RIMG_STORAGE_ROOT")]
    pub storage_root: String,

    /// Bucket for the s3 backend.
    #[arg(long, env = "RIMG_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "RIMG_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for the s3 backend.
    #[arg(long, default_value = DEFAULT_REGION, env = "RIMG_S3_REGION")]
    pub s3_region: String,

    /// Persist derivatives by default (overridable per request with ?save=).
    #[arg(long, default_value_t = true, env = "RIMG_SAVE_DERIVATIVES")]
    pub save_derivatives: bool,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Cache backend: "memory" or "none".
    #[arg(long, default_value = "memory", env = "RIMG_CACHE")]
    pub cache: String,

    /// Cache byte budget.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY, env = "RIMG_CACHE_CAPACITY")]
    pub cache_capacity: usize,

    /// Maximum number of cache entries.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_ENTRIES, env = "RIMG_CACHE_MAX_ENTRIES")]
    pub cache_max_entries: usize,

    /// Largest single object admitted to the cache, in bytes.
    #[arg(long, default_value_t = DEFAULT_CACHEABLE_CEILING, env = "RIMG_CACHE_MAX_OBJECT_SIZE")]
    pub cache_max_object_size: usize,

    // =========================================================================
    // Image Configuration
    // =========================================================================
    /// Default output format when a request names none.
    #[arg(long, default_value = "jpeg", env = "RIMG_FORMAT")]
    pub default_format: String,

    /// Default output quality (1-100) when a request names none.
    #[arg(long, default_value_t = DEFAULT_QUALITY, env = "RIMG_QUALITY")]
    pub default_quality: u8,

    /// Accepted upload formats.
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = ["jpeg".to_string(), "jpg".to_string(), "png".to_string(), "gif".to_string(), "webp".to_string()],
        env = "RIMG_ALLOWED_TYPES"
    )]
    pub allowed_types: Vec<String>,

    /// Directory holding logo overlay sources.
    #[arg(long, env = "RIMG_LOGO_DIR")]
    pub logo_dir: Option<String>,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// Upload size cap in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD, env = "RIMG_MAX_UPLOAD")]
    pub max_upload_size: usize,

    /// Emit ETags and honor If-None-Match on image responses.
    #[arg(long, default_value_t = true, env = "RIMG_ETAG")]
    pub etag: bool,

    /// Cache-Control max-age in seconds for image responses.
    #[arg(long, default_value_t = DEFAULT_MAX_AGE, env = "RIMG_MAX_AGE")]
    pub max_age: u32,

    /// Allowed CORS origins (comma-separated). Unset allows any origin.
    #[arg(long, env = "RIMG_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        let storage = self.storage_backend()?;
        self.cache_backend()?;

        if storage == StorageBackend::S3 && self.s3_bucket.is_none() {
            return Err(
                "S3 storage selected but no bucket provided. Set --s3-bucket or RIMG_S3_BUCKET"
                    .to_string(),
            );
        }
        if storage == StorageBackend::Fs && self.storage_root.is_empty() {
            return Err("storage_root must not be empty".to_string());
        }

        if self.default_quality == 0 || self.default_quality > 100 {
            return Err("default_quality must be between 1 and 100".to_string());
        }
        if self.allowed_types.is_empty() {
            return Err("allowed_types must not be empty".to_string());
        }

        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }
        if self.cache_max_entries == 0 {
            return Err("cache_max_entries must be greater than 0".to_string());
        }

        if self.max_upload_size < 1024 {
            return Err("max_upload_size must be at least 1KB".to_string());
        }

        Ok(())
    }

    /// The selected storage backend kind.
    pub fn storage_backend(&self) -> Result<StorageBackend, String> {
        self.storage.parse()
    }

    /// The selected cache backend kind.
    pub fn cache_backend(&self) -> Result<CacheBackend, String> {
        self.cache.parse()
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Tests
// =============================================================================
