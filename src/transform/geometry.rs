//! Pure geometry resolution for scale and crop requests.
//!
//! These functions compute target dimensions and crop rectangles from request
//! parameters without touching any pixels; the transform engine applies the
//! resolved geometry. Everything here is deterministic: the same source
//! dimensions and parameters always resolve to the same result, which is what
//! keeps variant keys honest.

use crate::request::{Gravity, OffsetCorner, RequestSpec, ScaleMode};

/// Scale parameters extracted from a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleParams {
    pub mode: Option<ScaleMode>,
    pub width: u32,
    pub height: u32,
    pub width_pct: u32,
    pub height_pct: u32,
    pub pct: u32,
}

impl From<&RequestSpec> for ScaleParams {
    fn from(spec: &RequestSpec) -> Self {
        Self {
            mode: spec.scale_mode,
            width: spec.scale_width,
            height: spec.scale_height,
            width_pct: spec.scale_width_pct,
            height_pct: spec.scale_height_pct,
            pct: spec.scale_pct,
        }
    }
}

/// Crop parameters extracted from a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CropParams {
    pub width: u32,
    pub height: u32,
    pub gravity: Option<Gravity>,
    pub offset: Option<OffsetCorner>,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl From<&RequestSpec> for CropParams {
    fn from(spec: &RequestSpec) -> Self {
        Self {
            width: spec.crop_width,
            height: spec.crop_height,
            gravity: spec.gravity,
            offset: spec.offset,
            offset_x: spec.offset_x,
            offset_y: spec.offset_y,
        }
    }
}

/// A resolved crop window.
///
/// The anchor may lie outside the source frame; bounds handling is the
/// transform engine's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub x: i64,
    pub y: i64,
}

/// Round half up: `floor(x + 0.5)`.
pub(crate) fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Resolve the target dimensions for a scale request.
///
/// Resolution order, later steps seeing the results of earlier ones:
///
/// 1. A both-axis percentage scales each axis by `pct/100`.
/// 2. A width-only percentage scales the width and pins the height to the
///    source; height-only is symmetric.
/// 3. With exactly one explicit dimension, the other is derived to preserve
///    aspect ratio.
/// 4. With both explicit dimensions, `fit` scales by the smaller axis ratio
///    (box-contained), `fill` by the larger (box-covering); no mode takes the
///    values verbatim, stretching non-uniformly.
///
/// Any resolved dimension that comes out non-positive is forced to 1.
pub fn resolve_scale(source_w: u32, source_h: u32, params: &ScaleParams) -> (u32, u32) {
    let w = source_w as f64;
    let h = source_h as f64;

    let mut target_w = params.width as i64;
    let mut target_h = params.height as i64;

    if params.pct > 0 {
        target_w = round_half_up(w * params.pct as f64 / 100.0);
        target_h = round_half_up(h * params.pct as f64 / 100.0);
    }
    if params.width_pct > 0 {
        target_w = round_half_up(w * params.width_pct as f64 / 100.0);
        target_h = source_h as i64;
    }
    if params.height_pct > 0 {
        target_w = source_w as i64;
        target_h = round_half_up(h * params.height_pct as f64 / 100.0);
    }

    if target_w > 0 && target_h == 0 {
        target_h = round_half_up(target_w as f64 * h / w);
    } else if target_h > 0 && target_w == 0 {
        target_w = round_half_up(target_h as f64 * w / h);
    } else if target_w > 0 && target_h > 0 {
        let ratio_w = target_w as f64 / w;
        let ratio_h = target_h as f64 / h;
        match params.mode {
            Some(ScaleMode::Fit) => {
                let ratio = ratio_w.min(ratio_h);
                target_w = round_half_up(w * ratio);
                target_h = round_half_up(h * ratio);
            }
            Some(ScaleMode::Fill) => {
                let ratio = ratio_w.max(ratio_h);
                target_w = round_half_up(w * ratio);
                target_h = round_half_up(h * ratio);
            }
            None => {}
        }
    }

    (target_w.max(1) as u32, target_h.max(1) as u32)
}

/// Resolve the crop window for a crop request.
///
/// A zero crop dimension defaults to the full source extent. The anchor is
/// placed by the nine-point gravity compass: corner gravities flush the
/// window into that corner, edge gravities center it on the perpendicular
/// axis, and center gravity centers on both. Unset gravity behaves as `nw`.
///
/// The optional offset nudges the anchor; the corner letters name the nudge
/// direction per axis (`l`/`t` negative, `r`/`b` positive). The result is not
/// clamped to the frame.
pub fn resolve_crop(source_w: u32, source_h: u32, params: &CropParams) -> CropRect {
    let w = source_w as i64;
    let h = source_h as i64;

    let crop_w = if params.width == 0 { w } else { params.width as i64 };
    let crop_h = if params.height == 0 { h } else { params.height as i64 };

    let mut x: i64 = 0;
    let mut y: i64 = 0;

    match params.gravity.unwrap_or(Gravity::Nw) {
        Gravity::Nw => {}
        Gravity::N => {
            x = round_half_up(w as f64 / 2.0) - round_half_up(crop_w as f64 / 2.0);
        }
        Gravity::Ne => {
            x = w - crop_w;
        }
        Gravity::W => {
            y = round_half_up(h as f64 / 2.0) - round_half_up(crop_h as f64 / 2.0);
        }
        Gravity::C => {
            x = round_half_up(w as f64 / 2.0) - round_half_up(crop_w as f64 / 2.0);
            y = round_half_up(h as f64 / 2.0) - round_half_up(crop_h as f64 / 2.0);
        }
        Gravity::E => {
            x = w - crop_w;
            y = round_half_up(h as f64 / 2.0) - round_half_up(crop_h as f64 / 2.0);
        }
        Gravity::Sw => {
            y = h - crop_h;
        }
        Gravity::S => {
            x = round_half_up(w as f64 / 2.0) - round_half_up(crop_w as f64 / 2.0);
            y = h - crop_h;
        }
        Gravity::Se => {
            x = w - crop_w;
            y = h - crop_h;
        }
    }

    let ox = params.offset_x as i64;
    let oy = params.offset_y as i64;
    match params.offset {
        Some(OffsetCorner::Lt) => {
            x -= ox;
            y -= oy;
        }
        Some(OffsetCorner::Lb) => {
            x -= ox;
            y += oy;
        }
        Some(OffsetCorner::Rt) => {
            x += ox;
            y -= oy;
        }
        Some(OffsetCorner::Rb) => {
            x += ox;
            y += oy;
        }
        None => {}
    }

    CropRect {
        width: crop_w as u32,
        height: crop_h as u32,
        x,
        y,
    }
}

// =============================================================================
// Tests
// =============================================================================
