//! HTTP request handlers.
//!
//! This is the thin adapter between the transport and the image service: it
//! maps URL parameters onto a [`RequestSpec`], applies configured defaults,
//! and translates service errors into HTTP statuses. No pipeline logic lives
//! here.
//!
//! # Endpoints
//!
//! - `POST /image` - upload an original (raw `image/*` body or multipart)
//! - `GET /image/{fingerprint}` - fetch a rendition
//! - `GET /info/{fingerprint}` - describe a rendition
//! - `DELETE /image/{fingerprint}` - delete an asset and all its variants
//! - `GET /health` - liveness check
//!
//! # Query parameters
//!
//! `origin` and `style` short-circuit everything else. Otherwise:
//! scale `s`/`sm`/`sw`/`sh`/`sp`/`swp`/`shp`, crop
//! `c`/`cg`/`cw`/`ch`/`co`/`cx`/`cy`, text overlay
//! `t`/`ts`/`tw`/`tc`/`tsc`/`tsw`/`tg`/`tx`/`ty`/`tr`/`to`, logo overlay
//! `l`/`lg`/`lx`/`ly`/`lw`/`lh`/`lo`/`lr`, output `f`/`q`/`r`/`bc`/`g`/`ao`/
//! `st`, persistence `save`. Flag parameters are true for any value except
//! `0`.

use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, ServiceError};
use crate::request::{
    fingerprint, is_valid_fingerprint, LogoOverlay, RequestSpec, TextOverlay,
};
use crate::service::{ImageDescriptor, ImageService};
use crate::transform::parse_format;

/// Multipart form field holding the uploaded file.
pub const UPLOAD_FIELD: &str = "file";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The rendition pipeline
    pub service: Arc<ImageService>,

    /// Output format applied when a request names none (or a disallowed one)
    pub default_format: String,

    /// Output quality applied when a request names none
    pub default_quality: u8,

    /// Accepted upload formats
    pub allowed_types: Vec<String>,

    /// Whether derivatives are persisted when a request does not say
    pub save_derivatives: bool,

    /// Whether to emit ETags and honor If-None-Match
    pub etag: bool,

    /// Cache-Control max-age in seconds (0 disables the header)
    pub max_age: u32,
}

// =============================================================================
// Responses and errors
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An HTTP-mapped error.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn unsupported_media(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Engine(EngineError::Decode(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Engine(EngineError::UnsupportedFormat(_))
            | ServiceError::Engine(EngineError::UnsupportedTransform(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServiceError::Engine(EngineError::Transform(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// =============================================================================
// Query parameters
// =============================================================================

/// Raw rendition query parameters. Names are short to keep rendition URLs
/// compact.
#[derive(Debug, Default, Deserialize)]
pub struct RenditionQuery {
    pub origin: Option<String>,
    pub style: Option<String>,
    pub save: Option<String>,

    // scale
    pub s: Option<String>,
    pub sm: Option<String>,
    pub sw: Option<u32>,
    pub sh: Option<u32>,
    pub sp: Option<u32>,
    pub swp: Option<u32>,
    pub shp: Option<u32>,

    // crop
    pub c: Option<String>,
    pub cg: Option<String>,
    pub cw: Option<u32>,
    pub ch: Option<u32>,
    pub co: Option<String>,
    pub cx: Option<i32>,
    pub cy: Option<i32>,

    // text overlay
    pub t: Option<String>,
    pub ts: Option<u32>,
    pub tw: Option<u32>,
    pub tc: Option<String>,
    pub tsc: Option<String>,
    pub tsw: Option<u32>,
    pub tg: Option<String>,
    pub tx: Option<i32>,
    pub ty: Option<i32>,
    pub tr: Option<i32>,
    pub to: Option<u32>,

    // logo overlay
    pub l: Option<String>,
    pub lg: Option<String>,
    pub lx: Option<i32>,
    pub ly: Option<i32>,
    pub lw: Option<u32>,
    pub lh: Option<u32>,
    pub lo: Option<u32>,
    pub lr: Option<i32>,

    // output
    pub f: Option<String>,
    pub q: Option<u32>,
    pub r: Option<i32>,
    pub bc: Option<String>,
    pub g: Option<String>,
    pub ao: Option<String>,
    pub st: Option<String>,
}

/// Flag parameters are true for any value except "0".
fn flag(v: &str) -> bool {
    v != "0"
}

/// Six hex digits become a #rrggbb color; anything else is dropped.
fn hex_color(v: Option<&str>) -> String {
    match v {
        Some(v) if v.len() == 6 && v.bytes().all(|b| b.is_ascii_hexdigit()) => {
            format!("#{}", v)
        }
        _ => String::new(),
    }
}

/// Map query parameters onto a request spec, applying configured defaults.
///
/// The defaults are fixed here, not in the pipeline, so that the variant key
/// always reflects the effective parameters: two requests differing only in
/// whether they spelled out the default format still share a key.
pub fn build_spec(state: &AppState, fp: String, q: &RenditionQuery) -> RequestSpec {
    let mut spec = RequestSpec {
        fingerprint: fp,
        ..RequestSpec::default()
    };

    if q.origin.as_deref().map(flag).unwrap_or(false) {
        spec.origin = true;
        return spec;
    }

    if let Some(style) = q.style.as_deref() {
        if !style.is_empty() {
            spec.style = Some(style.to_string());
            return spec;
        }
    }

    spec.save = q.save.as_deref().map(flag).unwrap_or(state.save_derivatives);

    spec.scale = q.s.as_deref().map(flag).unwrap_or(false);
    if spec.scale {
        spec.scale_mode = q.sm.as_deref().and_then(|m| m.parse().ok());
        spec.scale_width = q.sw.unwrap_or(0);
        spec.scale_height = q.sh.unwrap_or(0);
        spec.scale_pct = q.sp.unwrap_or(0);
        spec.scale_width_pct = q.swp.unwrap_or(0);
        spec.scale_height_pct = q.shp.unwrap_or(0);
    }

    spec.crop = q.c.as_deref().map(flag).unwrap_or(false);
    if spec.crop {
        spec.gravity = q.cg.as_deref().and_then(|g| g.parse().ok());
        spec.crop_width = q.cw.unwrap_or(0);
        spec.crop_height = q.ch.unwrap_or(0);
        spec.offset = q.co.as_deref().and_then(|o| o.parse().ok());
        spec.offset_x = q.cx.unwrap_or(0);
        spec.offset_y = q.cy.unwrap_or(0);
    }

    if let Some(content) = q.t.as_deref().filter(|t| !t.is_empty()) {
        spec.text = Some(TextOverlay {
            content: content.to_string(),
            font_size: q.ts.unwrap_or(0),
            font_weight: q.tw.unwrap_or(0),
            font_color: hex_color(q.tc.as_deref()),
            stroke_color: hex_color(q.tsc.as_deref()),
            stroke_width: q.tsw.unwrap_or(0),
            gravity: q.tg.as_deref().and_then(|g| g.parse().ok()),
            x: q.tx.unwrap_or(0),
            y: q.ty.unwrap_or(0),
            rotate: q.tr.unwrap_or(0),
            opacity: q.to.unwrap_or(0),
        });
    }

    if let Some(source) = q.l.as_deref().filter(|l| !l.is_empty()) {
        spec.logo = Some(LogoOverlay {
            source: source.to_string(),
            gravity: q.lg.as_deref().and_then(|g| g.parse().ok()),
            x: q.lx.unwrap_or(0),
            y: q.ly.unwrap_or(0),
            width: q.lw.unwrap_or(0),
            height: q.lh.unwrap_or(0),
            opacity: q.lo.unwrap_or(0),
            rotate: q.lr.unwrap_or(0),
        });
    }

    let format = q.f.as_deref().map(|f| f.to_ascii_lowercase());
    spec.format = Some(match format {
        Some(f) if state.allowed_types.iter().any(|t| t == &f) => f,
        _ => state.default_format.clone(),
    });

    let quality = q.q.unwrap_or(0);
    spec.quality = if quality == 0 {
        state.default_quality
    } else {
        quality.min(100) as u8
    };

    spec.rotate = q.r.unwrap_or(0);
    spec.fill_color = hex_color(q.bc.as_deref());
    spec.gray = q.g.as_deref().map(flag).unwrap_or(false);
    spec.auto_orient = q.ao.as_deref().map(flag).unwrap_or(true);
    spec.strip = q.st.as_deref().map(flag).unwrap_or(true);

    spec
}

// =============================================================================
// Handlers
// =============================================================================

/// Liveness check.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Upload an original image.
///
/// Accepts either a raw `image/*` body or a `multipart/form-data` upload with
/// a `file` field. The payload is format-sniffed against the configured
/// allow-list before anything is stored.
pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
) -> Result<Json<ImageDescriptor>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let data: Bytes = if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let mut found = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?
        {
            if field.name() == Some(UPLOAD_FIELD) {
                found = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(e.to_string()))?,
                );
                break;
            }
        }
        found.ok_or_else(|| {
            ApiError::bad_request(format!("missing multipart field {:?}", UPLOAD_FIELD))
        })?
    } else if content_type.starts_with("image/") {
        Bytes::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?
    } else {
        return Err(ApiError::bad_request(
            "expected an image/* body or a multipart/form-data upload",
        ));
    };

    if data.is_empty() {
        return Err(ApiError::bad_request("empty upload"));
    }

    let mime = image::guess_format(&data)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    if !state.allowed_types.iter().any(|t| mime.contains(t.as_str())) {
        return Err(ApiError::unsupported_media(format!(
            "{} uploads are not accepted",
            mime
        )));
    }

    let descriptor = state.service.save_image(&data).await?;
    info!(fingerprint = %descriptor.fingerprint, size = descriptor.size, "uploaded image");
    Ok(Json(descriptor))
}

/// Fetch a rendition.
pub async fn get_image_handler(
    State(state): State<AppState>,
    Path(fp): Path<String>,
    Query(query): Query<RenditionQuery>,
    request_headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !is_valid_fingerprint(&fp) {
        return Err(ApiError::not_found(format!("no such image: {}", fp)));
    }

    let spec = build_spec(&state, fp, &query);
    let data = state.service.get_image(&spec).await?;

    let content_type = response_content_type(&spec, &data);
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if state.max_age > 0 {
        if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", state.max_age)) {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&spec.variant_key()) {
        headers.insert("x-variant-key", value);
    }

    if state.etag {
        let etag = format!("\"{}\"", fingerprint(&data));
        let matched = request_headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == etag || v == "*")
            .unwrap_or(false);
        if matched {
            return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
        }
        if let Ok(value) = HeaderValue::from_str(&etag) {
            headers.insert(header::ETAG, value);
        }
    }

    info!(
        fingerprint = %spec.fingerprint,
        key = %spec.variant_key(),
        size = data.len(),
        "served rendition"
    );
    Ok((headers, data).into_response())
}

/// Describe a rendition.
pub async fn info_handler(
    State(state): State<AppState>,
    Path(fp): Path<String>,
    Query(query): Query<RenditionQuery>,
) -> Result<Json<ImageDescriptor>, ApiError> {
    if !is_valid_fingerprint(&fp) {
        return Err(ApiError::not_found(format!("no such image: {}", fp)));
    }

    let spec = build_spec(&state, fp, &query);
    let descriptor = state.service.info_image(&spec).await?;
    Ok(Json(descriptor))
}

/// Delete an asset and every stored variant.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(fp): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !is_valid_fingerprint(&fp) {
        return Err(ApiError::not_found(format!("no such image: {}", fp)));
    }

    state.service.delete_image(&fp).await?;
    info!(fingerprint = %fp, "deleted image");
    Ok(StatusCode::NO_CONTENT)
}

/// Pick the response content type: derivatives carry the effective output
/// format, origin and styled responses are sniffed from the bytes.
fn response_content_type(spec: &RequestSpec, data: &[u8]) -> &'static str {
    if !spec.origin && spec.style.is_none() {
        if let Some(mime) = spec
            .format
            .as_deref()
            .and_then(parse_format)
            .map(|f| f.to_mime_type())
        {
            return mime;
        }
    }
    image::guess_format(data)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

// =============================================================================
// Tests
// =============================================================================
