//! Content-addressable blob layout.
//!
//! Every stored blob lives at a location that is a pure function of
//! (fingerprint, variant key, origin flag); locations are recomputed on
//! demand and never persisted. The first six hex chars of the fingerprint
//! shard assets into a bounded two-level directory fan-out
//! (`0..=1023 / 0..=1023`), and all variants of one asset share the asset's
//! directory so the whole set can be deleted in one operation:
//!
//! ```text
//! <root>/<hex(fp[0:3])/4>/<hex(fp[3:6])/4>/<fp>/{origin | <variant key>}
//! ```

/// File name of the unmodified origin blob inside an asset directory.
pub const ORIGIN_NAME: &str = "origin";

fn shard(fingerprint: &str, lo: usize, hi: usize) -> u64 {
    fingerprint
        .get(lo..hi)
        .and_then(|s| u64::from_str_radix(s, 16).ok())
        .unwrap_or(0)
        / 4
}

/// Directory holding every blob of one asset, relative to the storage root.
pub fn asset_dir(fingerprint: &str) -> String {
    format!(
        "{}/{}/{}",
        shard(fingerprint, 0, 3),
        shard(fingerprint, 3, 6),
        fingerprint
    )
}

/// Location of one blob, relative to the storage root.
pub fn blob_path(fingerprint: &str, variant_key: &str, is_origin: bool) -> String {
    let name = if is_origin { ORIGIN_NAME } else { variant_key };
    format!("{}/{}", asset_dir(fingerprint), name)
}

// =============================================================================
// Tests
// =============================================================================
