//! Axum-based HTTP adapter.
//!
//! The server layer is deliberately thin: it parses transport input into
//! [`crate::request::RequestSpec`]s, hands them to the image service, and
//! maps outcomes to HTTP. The pipeline itself never sees transport-level
//! input.

mod handlers;
mod routes;

pub use handlers::{
    build_spec, delete_handler, get_image_handler, health_handler, info_handler, upload_handler,
    ApiError, AppState, ErrorResponse, HealthResponse, RenditionQuery, UPLOAD_FIELD,
};
pub use routes::{create_router, RouterConfig};
