//! Geometry resolution and the transform engine seam.
//!
//! Geometry (target dimensions, crop rectangles) is resolved here as pure
//! logic; pixel work is delegated through the [`TransformEngine`] trait, with
//! [`RasterEngine`] as the bundled `image`-crate-backed implementation.

mod engine;
mod geometry;
mod raster;

pub use engine::{ImageInfo, TransformEngine};
pub use geometry::{resolve_crop, resolve_scale, CropParams, CropRect, ScaleParams};
pub use raster::{format_name, parse_format, RasterEngine, DEFAULT_QUALITY};
