//! Prelude module for common chargemap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use chargemap::prelude::*;`

pub use crate::core::{
    bounds::BoundingBox,
    builder::PipelineBuilder,
    config::{CacheConfig, FetchConfig, KeyConfig, PipelineOptions, PipelineProfile, ProviderConfig},
    geo::LatLng,
    pipeline::{LoadOutcome, StationPipeline},
    viewport::{FilterSet, SourceSelector, Viewport},
};

pub use crate::data::{merge::merge_records, record::{Connector, StationRecord}};

pub use crate::providers::{
    chain::{ChainOutcome, ProviderChain},
    ocm::{OpenChargeMapProvider, WidenPolicy},
    overpass::OverpassProvider,
    snapshot::SnapshotProvider,
    synthetic::SyntheticProvider,
    ProviderQuery,
};

pub use crate::background::{
    cancel::CancellationToken,
    coordinator::{InFlightRequest, PipelineEvent, RequestCoordinator, UpdateMeta},
};

pub use crate::tiles::{cache::BoundedCache, grid::Tile};

pub use crate::traits::{CacheStats, JsonTransport, StationProvider};

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::Future;
