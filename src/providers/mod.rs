//! Upstream data sources and the chain that falls back between them.

pub mod chain;
pub mod http;
pub mod ocm;
pub mod overpass;
pub mod snapshot;
pub mod synthetic;

pub use chain::{ChainOutcome, ProviderChain};
pub use http::ReqwestTransport;
pub use ocm::{OpenChargeMapProvider, WidenPolicy};
pub use overpass::OverpassProvider;
pub use snapshot::SnapshotProvider;
pub use synthetic::SyntheticProvider;

use crate::core::bounds::BoundingBox;
use crate::core::viewport::FilterSet;
use crate::data::record::StationRecord;

/// What a single provider call is asked for
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQuery {
    pub bounds: BoundingBox,
    pub filters: FilterSet,
    /// Result cap forwarded to remote APIs
    pub max_results: u32,
    /// Whether a provider may retry an empty answer over a wider area
    pub allow_widen: bool,
}

impl ProviderQuery {
    pub fn new(bounds: BoundingBox, filters: FilterSet, max_results: u32) -> Self {
        Self {
            bounds,
            filters,
            max_results,
            allow_widen: true,
        }
    }

    /// The same query, restricted to its own bounds
    pub fn without_widen(mut self) -> Self {
        self.allow_widen = false;
        self
    }

    /// Keeps the records passing the record-level filters
    pub fn retain_matching(&self, records: Vec<StationRecord>) -> Vec<StationRecord> {
        if self.filters.is_unfiltered() {
            return records;
        }
        records
            .into_iter()
            .filter(|record| self.filters.matches(record))
            .collect()
    }
}
