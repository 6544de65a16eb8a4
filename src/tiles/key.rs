//! Precision-quantized cache keys.
//!
//! Viewports that differ only by sub-precision jitter (floating point noise
//! from a continuous pan) collapse to the same key, and the active filters
//! are appended so differently filtered queries never share an entry.

use crate::core::bounds::BoundingBox;
use crate::core::geo::round_to;
use crate::core::viewport::{FilterSet, Viewport};

/// Rounds each edge to `precision` decimals and joins them as `w,s,e,n`
pub fn quantize(bbox: &BoundingBox, precision: u32) -> String {
    let p = precision as usize;
    let [w, s, e, n] = [bbox.west, bbox.south, bbox.east, bbox.north]
        .map(|value| round_to(value, precision) + 0.0); // folds -0.0 into 0.0
    format!("{w:.p$},{s:.p$},{e:.p$},{n:.p$}")
}

/// Key for a box queried with the given filters
pub fn cache_key(bbox: &BoundingBox, filters: &FilterSet, precision: u32) -> String {
    format!("{}|{}", quantize(bbox, precision), filters.key_suffix())
}

/// Key for a whole viewport
pub fn viewport_key(viewport: &Viewport, precision: u32) -> String {
    cache_key(&viewport.bounds, &viewport.filters, precision)
}

/// Key for one tile of a partition
pub fn tile_key(tile_hash: &str, filters: &FilterSet) -> String {
    format!("tile:{tile_hash}|{}", filters.key_suffix())
}
