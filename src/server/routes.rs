//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                 - liveness check
//! POST   /image                  - upload an original
//! GET    /image/{fingerprint}    - fetch a rendition
//! DELETE /image/{fingerprint}    - delete an asset
//! GET    /info/{fingerprint}     - describe a rendition
//! ```

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    delete_handler, get_image_handler, health_handler, info_handler, upload_handler, AppState,
};

// =============================================================================
// Router Configuration
// =============================================================================

/// Transport-level router options.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Upload size cap in bytes
    pub max_upload_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
            max_upload_size: crate::config::DEFAULT_MAX_UPLOAD,
        }
    }
}

impl RouterConfig {
    /// Set specific allowed CORS origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Set the upload size cap.
    pub fn with_max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = bytes;
        self
    }
}

/// Build the application router.
pub fn create_router(state: AppState, config: RouterConfig) -> Router {
    let cors = match &config.cors_origins {
        None => CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([CONTENT_TYPE])
            .allow_origin(Any),
        Some(origins) => {
            let origins: Vec<HeaderValue> =
                origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([CONTENT_TYPE])
                .allow_origin(origins)
        }
    };

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/image", post(upload_handler))
        .route(
            "/image/{fingerprint}",
            get(get_image_handler).delete(delete_handler),
        )
        .route("/info/{fingerprint}", get(info_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .layer(cors);

    if config.enable_tracing {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}
