//! Canonical station records, provider normalization helpers and the
//! per-tile record merger.

pub mod merge;
pub mod normalize;
pub mod record;

pub use merge::merge_records;
pub use record::{Connector, StationFeatures, StationRecord};
