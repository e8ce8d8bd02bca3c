//! Request model and variant-key derivation.
//!
//! A [`RequestSpec`] is the canonical representation of one requested
//! rendition: a content fingerprint plus either the origin flag, a
//! pre-registered style name, or a set of transform parameters. Exactly one of
//! those three governs the identity of the rendition.
//!
//! # Key derivation
//!
//! [`RequestSpec::variant_key`] maps a spec to a deterministic identifier:
//!
//! - origin requests key to the fingerprint itself,
//! - styled requests key to the opaque style name,
//! - transform requests key to the SHA-256 of the canonical serialization of
//!   the transform-relevant fields.
//!
//! The serialization uses a fixed field order (struct declaration order) and
//! omits unset fields, so identical parameters always hash identically no
//! matter how the spec was constructed. Identity fields (`fingerprint`,
//! `origin`, `style`, `save`) are excluded from the serialization; the cache
//! key namespaces derivatives under their fingerprint instead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a hex-encoded content fingerprint (SHA-256).
pub const FINGERPRINT_LEN: usize = 64;

/// Compute the content fingerprint of uploaded bytes.
///
/// The fingerprint identifies one logical asset for its whole lifetime; it is
/// computed exactly once, at upload.
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check that a string is a well-formed fingerprint (64 lowercase hex chars).
pub fn is_valid_fingerprint(s: &str) -> bool {
    s.len() == FINGERPRINT_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

// =============================================================================
// Parameter vocabulary
// =============================================================================

/// How explicit width and height are combined when both are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    /// Box-contained: scale by min(widthRatio, heightRatio)
    Fit,
    /// Box-covering: scale by max(widthRatio, heightRatio), may overflow
    Fill,
}

impl FromStr for ScaleMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fit" => Ok(ScaleMode::Fit),
            "fill" => Ok(ScaleMode::Fill),
            _ => Err(()),
        }
    }
}

/// Nine-point anchor compass for crop windows and overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gravity {
    Nw,
    N,
    Ne,
    W,
    C,
    E,
    Sw,
    S,
    Se,
}

impl FromStr for Gravity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nw" => Ok(Gravity::Nw),
            "n" => Ok(Gravity::N),
            "ne" => Ok(Gravity::Ne),
            "w" => Ok(Gravity::W),
            "c" => Ok(Gravity::C),
            "e" => Ok(Gravity::E),
            "sw" => Ok(Gravity::Sw),
            "s" => Ok(Gravity::S),
            "se" => Ok(Gravity::Se),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Gravity::Nw => "nw",
            Gravity::N => "n",
            Gravity::Ne => "ne",
            Gravity::W => "w",
            Gravity::C => "c",
            Gravity::E => "e",
            Gravity::Sw => "sw",
            Gravity::S => "s",
            Gravity::Se => "se",
        };
        f.write_str(s)
    }
}

/// Corner naming the direction of an offset nudge applied to a crop anchor.
///
/// The letters name the nudge direction per axis: `l`/`t` move the anchor in
/// the negative direction, `r`/`b` in the positive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetCorner {
    Lt,
    Lb,
    Rt,
    Rb,
}

impl FromStr for OffsetCorner {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lt" => Ok(OffsetCorner::Lt),
            "lb" => Ok(OffsetCorner::Lb),
            "rt" => Ok(OffsetCorner::Rt),
            "rb" => Ok(OffsetCorner::Rb),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Overlay descriptors
// =============================================================================

/// Text overlay descriptor: content, font, color, stroke, placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextOverlay {
    pub content: String,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub font_size: u32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub font_weight: u32,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub font_color: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub stroke_color: String,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub stroke_width: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<Gravity>,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub x: i32,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub y: i32,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub rotate: i32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub opacity: u32,
}

/// Logo overlay descriptor: source image, placement, size, opacity, rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogoOverlay {
    /// Identifier of the overlay source image, resolved by the engine
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<Gravity>,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub x: i32,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub y: i32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub width: u32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub height: u32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub opacity: u32,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub rotate: i32,
}

// =============================================================================
// Request spec
// =============================================================================

/// Canonical representation of one requested rendition.
///
/// Exactly one of `origin`, `style`, or the transform parameters governs the
/// identity of the rendition. The serde attributes define the canonical
/// serialization hashed by [`variant_key`](Self::variant_key): field order is
/// the declaration order below and unset fields are omitted, so the derived
/// key is stable under any construction order. Reordering or renaming fields
/// changes every derived key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestSpec {
    /// Content fingerprint of the asset (not part of the hashed serialization)
    #[serde(skip)]
    pub fingerprint: String,

    /// Request the unmodified origin bytes
    #[serde(skip)]
    pub origin: bool,

    /// Pre-registered style name; bypasses transform encoding when set
    #[serde(skip)]
    pub style: Option<String>,

    /// Persist the derivative after transforming (write-behind to storage)
    #[serde(skip)]
    pub save: bool,

    // scale params
    #[serde(skip_serializing_if = "is_false")]
    pub scale: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_mode: Option<ScaleMode>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub scale_width: u32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub scale_height: u32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub scale_width_pct: u32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub scale_height_pct: u32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub scale_pct: u32,

    // crop params
    #[serde(skip_serializing_if = "is_false")]
    pub crop: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<Gravity>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub crop_width: u32,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub crop_height: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<OffsetCorner>,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub offset_x: i32,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub offset_y: i32,

    // overlays
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextOverlay>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<LogoOverlay>,

    // output params
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(skip_serializing_if = "is_zero_u8")]
    pub quality: u8,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub rotate: i32,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub fill_color: String,

    #[serde(skip_serializing_if = "is_false")]
    pub gray: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub auto_orient: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub strip: bool,
}

impl RequestSpec {
    /// Spec for the unmodified origin bytes of an asset.
    pub fn origin(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            origin: true,
            ..Self::default()
        }
    }

    /// Spec for a pre-registered style of an asset.
    pub fn styled(fingerprint: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            style: Some(style.into()),
            ..Self::default()
        }
    }

    /// Derive the variant key identifying this rendition.
    ///
    /// Origin specs key to the fingerprint and styled specs to the style name,
    /// regardless of any transform fields also present. Transform specs hash
    /// their canonical serialization; distinct parameter sets collide only
    /// with cryptographic-hash probability.
    pub fn variant_key(&self) -> String {
        if self.origin {
            return self.fingerprint.clone();
        }
        if let Some(style) = &self.style {
            if !style.is_empty() {
                return style.clone();
            }
        }
        // Serializing a plain field struct cannot fail.
        let encoded = serde_json::to_vec(self).expect("request spec serialization");
        hex::encode(Sha256::digest(&encoded))
    }

    /// Derive the cache key for this rendition.
    ///
    /// The hashed variant key excludes the fingerprint, so derivatives are
    /// namespaced under their asset to keep identical transforms of different
    /// assets from colliding in a shared cache.
    pub fn cache_key(&self) -> String {
        if self.origin {
            return self.fingerprint.clone();
        }
        format!("{}:{}", self.fingerprint, self.variant_key())
    }

    /// Check that the spec can be resolved.
    pub fn validate(&self) -> Result<(), crate::error::ServiceError> {
        use crate::error::ServiceError;

        if !is_valid_fingerprint(&self.fingerprint) {
            return Err(ServiceError::Validation(format!(
                "malformed fingerprint: {:?}",
                self.fingerprint
            )));
        }
        if self.quality > 100 {
            return Err(ServiceError::Validation(format!(
                "quality must be 1-100, got {}",
                self.quality
            )));
        }
        if self.scale_pct > 0 && (self.scale_width_pct > 0 || self.scale_height_pct > 0) {
            return Err(ServiceError::Validation(
                "both-axis and single-axis scale percentages are contradictory".into(),
            ));
        }
        if self.scale_width_pct > 0 && self.scale_height_pct > 0 {
            return Err(ServiceError::Validation(
                "width and height scale percentages are contradictory; use scale_pct".into(),
            ));
        }
        Ok(())
    }
}

fn is_false(v: &bool) -> bool {
    !v
}

fn is_zero_u8(v: &u8) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const FP: &str = "a3f5c0d9e8b71246a3f5c0d9e8b71246a3f5c0d9e8b71246a3f5c0d9e8b71246";

    fn scaled_spec() -> RequestSpec {
        RequestSpec {
            fingerprint: FP.to_string(),
            scale: true,
            scale_width: 200,
            quality: 80,
            format: Some("jpeg".to_string()),
            ..RequestSpec::default()
        }
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint(b"hello world");
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(is_valid_fingerprint(&fp));
        // Same bytes, same fingerprint
        assert_eq!(fp, fingerprint(b"hello world"));
        assert_ne!(fp, fingerprint(b"hello worlds"));
    }

    #[test]
    fn test_fingerprint_validation() {
        assert!(is_valid_fingerprint(FP));
        assert!(!is_valid_fingerprint(&FP[..63]));
        assert!(!is_valid_fingerprint(&format!("{}x", &FP[..63])));
        assert!(!is_valid_fingerprint(&FP.to_uppercase()));
    }

    #[test]
    fn test_origin_keys_to_fingerprint() {
        let mut spec = RequestSpec::origin(FP);
        // Stray transform fields must not change the origin key
        spec.scale = true;
        spec.scale_width = 100;
        spec.quality = 90;
        assert_eq!(spec.variant_key(), FP);
        assert_eq!(spec.cache_key(), FP);
    }

    #[test]
    fn test_style_bypasses_transform_encoding() {
        let spec = RequestSpec::styled(FP, "avatar-small");
        assert_eq!(spec.variant_key(), "avatar-small");
        assert_eq!(spec.cache_key(), format!("{}:avatar-small", FP));
    }

    #[test]
    fn test_variant_key_deterministic() {
        assert_eq!(scaled_spec().variant_key(), scaled_spec().variant_key());
    }

    #[test]
    fn test_variant_key_independent_of_fingerprint() {
        let a = scaled_spec();
        let mut b = scaled_spec();
        b.fingerprint = fingerprint(b"other asset");
        // Same transform, different asset: same variant key...
        assert_eq!(a.variant_key(), b.variant_key());
        // ...but distinct cache keys
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_distinct_params_distinct_keys() {
        let a = scaled_spec();
        let mut b = scaled_spec();
        b.scale_width = 201;
        assert_ne!(a.variant_key(), b.variant_key());

        let mut c = scaled_spec();
        c.gray = true;
        assert_ne!(a.variant_key(), c.variant_key());
    }

    #[test]
    fn test_unset_fields_equivalent_to_defaults() {
        // A spec built field by field and one built from default with the same
        // effective parameters must hash identically.
        let mut a = RequestSpec::default();
        a.fingerprint = FP.to_string();
        a.scale = true;
        a.scale_width = 200;
        a.quality = 80;
        a.format = Some("jpeg".to_string());

        assert_eq!(a.variant_key(), scaled_spec().variant_key());
    }

    #[test]
    fn test_validate_rejects_contradictory_percentages() {
        let mut spec = scaled_spec();
        spec.scale_pct = 50;
        spec.scale_width_pct = 50;
        assert!(spec.validate().is_err());

        let mut spec = scaled_spec();
        spec.scale_width_pct = 50;
        spec.scale_height_pct = 50;
        assert!(spec.validate().is_err());

        let mut spec = scaled_spec();
        spec.scale_pct = 50;
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fingerprint() {
        let spec = RequestSpec::origin("not-a-fingerprint");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_gravity_parsing() {
        assert_eq!("nw".parse::<Gravity>(), Ok(Gravity::Nw));
        assert_eq!("c".parse::<Gravity>(), Ok(Gravity::C));
        assert_eq!("se".parse::<Gravity>(), Ok(Gravity::Se));
        assert!("north".parse::<Gravity>().is_err());
    }
}
