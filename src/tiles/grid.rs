use crate::core::bounds::BoundingBox;
use crate::core::geo::LatLng;
use crate::tiles::key::quantize;
use serde::{Deserialize, Serialize};

/// One cell of an `n x n` grid partition of a parent box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub bounds: BoundingBox,
    /// Row index, counted from the south edge
    pub row: u32,
    /// Column index, counted from the west edge
    pub col: u32,
    /// Side length of the grid the tile belongs to
    pub grid: u32,
    /// Stable hash of the rounded corner values
    pub hash: String,
}

impl Tile {
    fn new(bounds: BoundingBox, row: u32, col: u32, grid: u32, precision: u32) -> Self {
        let hash = format!("{:016x}", fxhash::hash64(&quantize(&bounds, precision)));
        Self {
            bounds,
            row,
            col,
            grid,
            hash,
        }
    }

    /// Whether `point` belongs to this tile.
    ///
    /// Membership is half-open (`west <= lng < east`, `south <= lat < north`)
    /// except on the parent's east and north edges, which stay closed. Every
    /// point of the parent therefore belongs to exactly one tile.
    pub fn owns(&self, point: &LatLng) -> bool {
        let sw = self.bounds.south_west();
        let ne = self.bounds.north_east();
        let last_col = self.col + 1 >= self.grid;
        let last_row = self.row + 1 >= self.grid;

        point.lng >= sw.lng
            && (point.lng < ne.lng || (last_col && point.lng == ne.lng))
            && point.lat >= sw.lat
            && (point.lat < ne.lat || (last_row && point.lat == ne.lat))
    }
}

/// Splits `bbox` into an `n x n` grid of equal steps.
///
/// Adjacent tiles share their edge values exactly and the outer tiles end on
/// the parent's edges, so the partition covers the parent with no gaps.
/// Points on a shared edge are assigned by [`Tile::owns`]. `n = 0` is
/// treated as 1.
pub fn partition(bbox: &BoundingBox, n: u32, precision: u32) -> Vec<Tile> {
    let n = n.max(1);
    let lng_edges = edges(bbox.west, bbox.east, n);
    let lat_edges = edges(bbox.south, bbox.north, n);

    let mut tiles = Vec::with_capacity((n as usize).saturating_mul(n as usize));
    for row in 0..n as usize {
        for col in 0..n as usize {
            let bounds = BoundingBox {
                west: lng_edges[col],
                south: lat_edges[row],
                east: lng_edges[col + 1],
                north: lat_edges[row + 1],
            };
            tiles.push(Tile::new(bounds, row as u32, col as u32, n, precision));
        }
    }
    tiles
}

fn edges(min: f64, max: f64, n: u32) -> Vec<f64> {
    let step = (max - min) / n as f64;
    (0..=n)
        .map(|i| if i == n { max } else { min + step * i as f64 })
        .collect()
}
