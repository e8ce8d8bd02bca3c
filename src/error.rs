use thiserror::Error;

/// Errors from cache backends.
///
/// Cache failures of every kind are non-fatal: the cache is an accelerator,
/// never a source of truth. The orchestrator logs these and falls through to
/// the next tier.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The key is not present in the cache (expected, triggers fallback)
    #[error("cache miss: {0}")]
    Miss(String),

    /// I/O or connection failure talking to the cache backend
    #[error("cache backend unavailable: {0}")]
    Backend(String),
}

/// Errors from blob storage backends.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// No blob stored at the requested location
    #[error("blob not found: {0}")]
    NotFound(String),

    /// I/O or connection failure talking to the storage backend
    #[error("storage backend unavailable: {0}")]
    Backend(String),
}

/// Errors from the transform engine.
///
/// Engine failures are always fatal for the operation that triggered them.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The payload could not be decoded as an image
    #[error("decode error: {0}")]
    Decode(String),

    /// The requested target format is not supported (maps to HTTP 415)
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The requested transform is outside this engine's vocabulary
    #[error("unsupported transform: {0}")]
    UnsupportedTransform(String),

    /// The transform itself failed on a decodable image
    #[error("transform error: {0}")]
    Transform(String),
}

/// The single per-operation outcome surfaced to callers of the image service.
///
/// Internal fallbacks between tiers are invisible except as latency; only one
/// success or failure is reported per Save/Get/Info/Delete.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// No bytes exist at any required tier for this request
    #[error("image not found: {0}")]
    NotFound(String),

    /// The request cannot be resolved (bad fingerprint, contradictory params)
    #[error("invalid request: {0}")]
    Validation(String),

    /// A required (authoritative) backend operation failed
    #[error("backend unavailable: {0}")]
    Backend(String),

    /// The transform engine rejected or failed on the payload
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(loc) => ServiceError::NotFound(loc),
            StorageError::Backend(msg) => ServiceError::Backend(msg),
        }
    }
}
