//! # chargemap
//!
//! Viewport-driven charging station data pipeline.
//!
//! The library turns a continuously changing map viewport into a
//! de-duplicated, filtered and cached list of charging station records,
//! sourced from an ordered chain of unreliable upstream providers. A
//! [`RequestCoordinator`] debounces viewport events and guarantees that only
//! the most recently issued request is ever committed to visible state.

pub mod background;
pub mod core;
pub mod data;
pub mod prelude;
pub mod providers;
pub mod runtime;
pub mod tiles;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    bounds::BoundingBox,
    builder::PipelineBuilder,
    config::{PipelineOptions, PipelineProfile},
    geo::LatLng,
    pipeline::{CachedRecords, LoadOutcome, StationPipeline},
    viewport::{FilterSet, SourceSelector, Viewport},
};

pub use background::{
    cancel::CancellationToken,
    coordinator::{InFlightRequest, PipelineEvent, RequestCoordinator, UpdateMeta},
};

pub use data::{
    merge::merge_records,
    record::{Connector, StationRecord},
};

pub use providers::{
    chain::{ChainOutcome, ProviderChain},
    http::ReqwestTransport,
    ocm::{OpenChargeMapProvider, WidenPolicy},
    overpass::OverpassProvider,
    snapshot::SnapshotProvider,
    synthetic::SyntheticProvider,
    ProviderQuery,
};

pub use tiles::{cache::BoundedCache, grid::Tile};

pub use traits::{CacheStats, JsonTransport, StationProvider};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Provider {0} returned no usable records")]
    EmptyResult(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("All providers exhausted, including the synthetic fallback")]
    ChainExhausted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MapError {
    /// Errors the provider chain absorbs by advancing to the next source.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. }
                | Self::EmptyResult(_)
                | Self::Io(_)
                | Self::Network(_)
                | Self::Serialization(_)
        )
    }

    /// Errors that reach the rendering layer as `PipelineEvent::Error`.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::InvalidBoundingBox(_) | Self::ChainExhausted)
    }
}

/// Error type alias for convenience
pub type Error = MapError;
