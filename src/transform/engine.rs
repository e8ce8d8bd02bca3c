//! Transform engine contract.
//!
//! The pipeline delegates all pixel-level work (decode, resize, rotate,
//! overlay rendering, encode) to a [`TransformEngine`]. The orchestrator only
//! ever sees opaque bytes going in and coming out; geometry resolution stays
//! on this side of the seam (see [`super::geometry`]).

use std::collections::HashMap;

use crate::error::EngineError;
use crate::request::RequestSpec;

/// Descriptor of a decoded image, as reported by [`TransformEngine::info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Pixel width
    pub width: u32,

    /// Pixel height
    pub height: u32,

    /// Lowercase format name ("jpeg", "png", ...)
    pub format: String,

    /// Encoded size in bytes
    pub size: usize,

    /// EXIF-style orientation name ("TOP_LEFT", "RIGHT_TOP", ...)
    pub orientation: String,

    /// Additional metadata key/value pairs the decoder exposed
    pub metadata: HashMap<String, String>,
}

/// An engine that decodes, transforms, and re-encodes image bytes.
///
/// Implementations must honor the full [`RequestSpec`] transform vocabulary:
/// target format (or keep-original), quality 1-100, grayscale, rotation with
/// fill color for exposed corners, auto-orient, strip-metadata, and the text
/// and logo overlay descriptors. An engine that cannot express a requested
/// transform fails with [`EngineError::UnsupportedTransform`] rather than
/// silently dropping it.
pub trait TransformEngine: Send + Sync {
    /// Inspect image bytes without transforming them.
    fn info(&self, data: &[u8]) -> Result<ImageInfo, EngineError>;

    /// Apply the transforms described by `spec` and return the encoded result.
    fn convert(&self, data: &[u8], spec: &RequestSpec) -> Result<Vec<u8>, EngineError>;
}
