//! Raster transform engine backed by the `image` crate.
//!
//! This is the default [`TransformEngine`]: it decodes the source, applies
//! the resolved geometry and pixel transforms, and re-encodes at the
//! requested format and quality.
//!
//! # Coverage
//!
//! Rotation is supported in multiples of 90 degrees (no corners are exposed,
//! so the fill color is never consulted). Arbitrary angles and text overlays
//! require a rasterizer this engine does not carry and fail with
//! `UnsupportedTransform`; the trait contract still carries the descriptors
//! for engines that can honor them. Metadata stripping is inherent here:
//! re-encoding never copies source metadata into the output.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};

use crate::error::EngineError;
use crate::request::{LogoOverlay, RequestSpec};

use super::engine::{ImageInfo, TransformEngine};
use super::geometry::{resolve_crop, resolve_scale, CropParams, ScaleParams};

/// Quality used when a request leaves it unset.
pub const DEFAULT_QUALITY: u8 = 75;

/// Raster engine configuration and state.
///
/// The engine is stateless apart from the optional logo directory; it is
/// cheap to construct and needs no process-wide init or teardown.
#[derive(Debug, Clone, Default)]
pub struct RasterEngine {
    logo_dir: Option<PathBuf>,
}

impl RasterEngine {
    /// Create an engine without logo overlay support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine resolving logo overlay sources under `dir`.
    pub fn with_logo_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            logo_dir: Some(dir.into()),
        }
    }

    fn decode(&self, data: &[u8]) -> Result<(DynamicImage, ImageFormat, Orientation), EngineError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| EngineError::Decode("unrecognized image format".to_string()))?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let image =
            DynamicImage::from_decoder(decoder).map_err(|e| EngineError::Decode(e.to_string()))?;
        Ok((image, format, orientation))
    }

    fn apply_logo(
        &self,
        image: &mut DynamicImage,
        logo: &LogoOverlay,
    ) -> Result<(), EngineError> {
        let dir = self.logo_dir.as_ref().ok_or_else(|| {
            EngineError::UnsupportedTransform("no logo directory configured".to_string())
        })?;
        let path = resolve_logo_source(dir, &logo.source)?;
        let bytes = std::fs::read(&path)
            .map_err(|e| EngineError::Transform(format!("read logo {}: {}", path.display(), e)))?;
        let mut overlay_img = image::load_from_memory(&bytes)
            .map_err(|e| EngineError::Decode(format!("logo {}: {}", logo.source, e)))?;

        if logo.width > 0 || logo.height > 0 {
            let params = ScaleParams {
                width: logo.width,
                height: logo.height,
                ..ScaleParams::default()
            };
            let (w, h) = resolve_scale(overlay_img.width(), overlay_img.height(), &params);
            overlay_img = overlay_img.resize_exact(w, h, FilterType::Lanczos3);
        }

        match logo.rotate.rem_euclid(360) {
            0 => {}
            90 => overlay_img = overlay_img.rotate90(),
            180 => overlay_img = overlay_img.rotate180(),
            270 => overlay_img = overlay_img.rotate270(),
            _ => {
                return Err(EngineError::UnsupportedTransform(format!(
                    "logo rotation must be a multiple of 90 degrees, got {}",
                    logo.rotate
                )))
            }
        }

        if logo.opacity > 0 && logo.opacity < 100 {
            let mut rgba = overlay_img.to_rgba8();
            for pixel in rgba.pixels_mut() {
                pixel[3] = (pixel[3] as u32 * logo.opacity / 100) as u8;
            }
            overlay_img = DynamicImage::ImageRgba8(rgba);
        }

        // Gravity positions the overlay exactly like a crop window anchor.
        let params = CropParams {
            width: overlay_img.width(),
            height: overlay_img.height(),
            gravity: logo.gravity,
            ..CropParams::default()
        };
        let anchor = resolve_crop(image.width(), image.height(), &params);
        imageops::overlay(
            image,
            &overlay_img,
            anchor.x + logo.x as i64,
            anchor.y + logo.y as i64,
        );
        Ok(())
    }
}

impl TransformEngine for RasterEngine {
    fn info(&self, data: &[u8]) -> Result<ImageInfo, EngineError> {
        let (image, format, orientation) = self.decode(data)?;

        let mut metadata = HashMap::new();
        metadata.insert("color_type".to_string(), format!("{:?}", image.color()));

        Ok(ImageInfo {
            width: image.width(),
            height: image.height(),
            format: format_name(format).to_string(),
            size: data.len(),
            orientation: orientation_name(orientation).to_string(),
            metadata,
        })
    }

    fn convert(&self, data: &[u8], spec: &RequestSpec) -> Result<Vec<u8>, EngineError> {
        let (mut image, src_format, orientation) = self.decode(data)?;

        if spec.auto_orient {
            image.apply_orientation(orientation);
        }

        if spec.scale {
            let (w, h) = resolve_scale(image.width(), image.height(), &ScaleParams::from(spec));
            image = image.resize_exact(w, h, FilterType::Lanczos3);
        }

        if spec.crop {
            let rect = resolve_crop(image.width(), image.height(), &CropParams::from(spec));
            // The resolved window may reach outside the frame; crop the
            // intersection and reject windows that miss the frame entirely.
            let x0 = rect.x.max(0);
            let y0 = rect.y.max(0);
            let x1 = (rect.x + rect.width as i64).min(image.width() as i64);
            let y1 = (rect.y + rect.height as i64).min(image.height() as i64);
            if x0 >= x1 || y0 >= y1 {
                return Err(EngineError::Transform(format!(
                    "crop window {}x{}+{}+{} does not intersect the {}x{} frame",
                    rect.width,
                    rect.height,
                    rect.x,
                    rect.y,
                    image.width(),
                    image.height()
                )));
            }
            image = image.crop_imm(
                x0 as u32,
                y0 as u32,
                (x1 - x0) as u32,
                (y1 - y0) as u32,
            );
        }

        match spec.rotate.rem_euclid(360) {
            0 => {}
            90 => image = image.rotate90(),
            180 => image = image.rotate180(),
            270 => image = image.rotate270(),
            _ => {
                return Err(EngineError::UnsupportedTransform(format!(
                    "rotation must be a multiple of 90 degrees, got {}",
                    spec.rotate
                )))
            }
        }

        if let Some(logo) = &spec.logo {
            self.apply_logo(&mut image, logo)?;
        }

        if spec.text.is_some() {
            return Err(EngineError::UnsupportedTransform(
                "text overlay requires an engine with font rasterization".to_string(),
            ));
        }

        if spec.gray {
            image = DynamicImage::ImageLuma8(image.to_luma8());
        }

        let target = match spec.format.as_deref() {
            None | Some("") | Some("none") => src_format,
            Some(name) => parse_format(name)
                .ok_or_else(|| EngineError::UnsupportedFormat(name.to_string()))?,
        };

        encode(&image, target, spec.quality)
    }
}

/// Encode `image` as `format`, honoring quality for JPEG output.
fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, EngineError> {
    let image = normalize_color_for(format, image);
    let mut buf = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            let quality = if quality == 0 {
                DEFAULT_QUALITY
            } else {
                quality.min(100)
            };
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            image
                .write_with_encoder(encoder)
                .map_err(|e| EngineError::Transform(e.to_string()))?;
        }
        _ => {
            image
                .write_to(&mut buf, format)
                .map_err(|e| EngineError::Transform(e.to_string()))?;
        }
    }
    let out = buf.into_inner();
    if out.is_empty() {
        return Err(EngineError::Transform("encoder produced no bytes".to_string()));
    }
    Ok(out)
}

/// Convert to a color type the target encoder accepts.
fn normalize_color_for(format: ImageFormat, image: &DynamicImage) -> DynamicImage {
    match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg if image.color().has_alpha() => {
            DynamicImage::ImageRgb8(image.to_rgb8())
        }
        // The GIF encoder wants RGBA frames
        ImageFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8()),
        // The lossless WebP encoder takes RGB/RGBA only
        ImageFormat::WebP if image.color().has_alpha() => {
            DynamicImage::ImageRgba8(image.to_rgba8())
        }
        ImageFormat::WebP => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image.clone(),
    }
}

/// Map a request format name to an encoder format.
pub fn parse_format(name: &str) -> Option<ImageFormat> {
    match name {
        "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "gif" => Some(ImageFormat::Gif),
        "webp" => Some(ImageFormat::WebP),
        "bmp" => Some(ImageFormat::Bmp),
        "tiff" | "tif" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

/// Lowercase name of a detected format.
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        _ => "unknown",
    }
}

fn orientation_name(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::NoTransforms => "TOP_LEFT",
        Orientation::FlipHorizontal => "TOP_RIGHT",
        Orientation::Rotate180 => "BOTTOM_RIGHT",
        Orientation::FlipVertical => "BOTTOM_LEFT",
        Orientation::Rotate90FlipH => "LEFT_TOP",
        Orientation::Rotate90 => "RIGHT_TOP",
        Orientation::Rotate270FlipH => "RIGHT_BOTTOM",
        Orientation::Rotate270 => "LEFT_BOTTOM",
    }
}

/// Resolve a logo source name inside the configured directory, rejecting
/// anything that could escape it.
fn resolve_logo_source(dir: &Path, source: &str) -> Result<PathBuf, EngineError> {
    let relative = Path::new(source);
    let sane = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if source.is_empty() || !sane {
        return Err(EngineError::Transform(format!(
            "invalid logo source: {:?}",
            source
        )));
    }
    Ok(dir.join(relative))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};

    fn test_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 0])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([((x + y) % 256) as u8]));
        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, 90);
        DynamicImage::ImageLuma8(img)
            .write_with_encoder(encoder)
            .unwrap();
        buf.into_inner()
    }

    fn spec() -> RequestSpec {
        RequestSpec {
            fingerprint: crate::request::fingerprint(b"fixture"),
            ..RequestSpec::default()
        }
    }

    #[test]
    fn test_info_reports_dimensions_and_format() {
        let engine = RasterEngine::new();
        let data = test_png(64, 48);
        let info = engine.info(&data).unwrap();
        assert_eq!(info.width, 64);
        assert_eq!(info.height, 48);
        assert_eq!(info.format, "png");
        assert_eq!(info.size, data.len());
        assert_eq!(info.orientation, "TOP_LEFT");
    }

    #[test]
    fn test_info_rejects_garbage() {
        let engine = RasterEngine::new();
        assert!(matches!(
            engine.info(b"not an image at all"),
            Err(EngineError::Decode(_))
        ));
    }

    #[test]
    fn test_convert_scales_to_resolved_target() {
        let engine = RasterEngine::new();
        let mut spec = spec();
        spec.scale = true;
        spec.scale_width = 32;

        let out = engine.convert(&test_png(64, 48), &spec).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!((img.width(), img.height()), (32, 24));
    }

    #[test]
    fn test_convert_crops_center() {
        let engine = RasterEngine::new();
        let mut spec = spec();
        spec.crop = true;
        spec.crop_width = 20;
        spec.crop_height = 10;
        spec.gravity = Some(crate::request::Gravity::C);

        let out = engine.convert(&test_png(64, 48), &spec).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!((img.width(), img.height()), (20, 10));
    }

    #[test]
    fn test_convert_right_angle_rotation_swaps_axes() {
        let engine = RasterEngine::new();
        let mut spec = spec();
        spec.rotate = 90;

        let out = engine.convert(&test_png(64, 48), &spec).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!((img.width(), img.height()), (48, 64));
    }

    #[test]
    fn test_convert_rejects_arbitrary_rotation() {
        let engine = RasterEngine::new();
        let mut spec = spec();
        spec.rotate = 45;
        assert!(matches!(
            engine.convert(&test_png(64, 48), &spec),
            Err(EngineError::UnsupportedTransform(_))
        ));
    }

    #[test]
    fn test_convert_changes_format() {
        let engine = RasterEngine::new();
        let mut spec = spec();
        spec.format = Some("jpeg".to_string());
        spec.quality = 80;

        let out = engine.convert(&test_png(64, 48), &spec).unwrap();
        // JPEG SOI marker
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_convert_keeps_format_when_unset() {
        let engine = RasterEngine::new();
        let out = engine.convert(&test_jpeg(32, 32), &spec()).unwrap();
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_convert_rejects_unknown_format() {
        let engine = RasterEngine::new();
        let mut spec = spec();
        spec.format = Some("xpm".to_string());
        assert!(matches!(
            engine.convert(&test_png(8, 8), &spec),
            Err(EngineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_convert_grayscale() {
        let engine = RasterEngine::new();
        let mut spec = spec();
        spec.gray = true;

        let out = engine.convert(&test_png(16, 16), &spec).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert!(!img.color().has_color());
    }

    #[test]
    fn test_convert_rejects_text_overlay() {
        let engine = RasterEngine::new();
        let mut spec = spec();
        spec.text = Some(crate::request::TextOverlay {
            content: "watermark".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            engine.convert(&test_png(8, 8), &spec),
            Err(EngineError::UnsupportedTransform(_))
        ));
    }

    #[test]
    fn test_logo_overlay_requires_configured_dir() {
        let engine = RasterEngine::new();
        let mut spec = spec();
        spec.logo = Some(LogoOverlay {
            source: "logo.png".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            engine.convert(&test_png(64, 48), &spec),
            Err(EngineError::UnsupportedTransform(_))
        ));
    }

    #[test]
    fn test_logo_overlay_composites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), test_png(8, 8)).unwrap();

        let engine = RasterEngine::with_logo_dir(dir.path());
        let mut spec = spec();
        spec.logo = Some(LogoOverlay {
            source: "logo.png".to_string(),
            gravity: Some(crate::request::Gravity::Se),
            opacity: 50,
            ..Default::default()
        });

        let out = engine.convert(&test_png(64, 48), &spec).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn test_logo_source_cannot_escape_dir() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RasterEngine::with_logo_dir(dir.path());
        let mut spec = spec();
        spec.logo = Some(LogoOverlay {
            source: "../secrets.png".to_string(),
            ..Default::default()
        });
        assert!(engine.convert(&test_png(8, 8), &spec).is_err());
    }
}
