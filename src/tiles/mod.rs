//! Spatial keys, grid partitioning and the shared bounded cache

pub mod cache;
pub mod grid;
pub mod key;

// Re-exports for convenience
pub use cache::{BoundedCache, CacheEntry};
pub use grid::{partition, Tile};
pub use key::{cache_key, quantize, tile_key, viewport_key};
