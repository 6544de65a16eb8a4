//! Shared trait abstractions
//!
//! The seams of the pipeline: data sources behind the provider chain, the
//! HTTP transport the remote providers speak through, and the cache
//! statistics.

use crate::background::cancel::CancellationToken;
use crate::data::record::StationRecord;
use crate::providers::ProviderQuery;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A source of charging station records.
///
/// Implementations fetch raw data for a query and run it through their own
/// schema normalizer, so everything leaving `fetch` is canonical. Malformed
/// entries are dropped inside the normalizer; an empty `Ok` is a valid
/// answer that the chain treats as "try the next provider".
#[async_trait]
pub trait StationProvider: Send + Sync {
    /// Short stable name, used in `source` fields, logs and source selectors
    fn name(&self) -> &str;

    /// Fetch and normalize records for `query`.
    ///
    /// `token` is checked at I/O boundaries; a cancelled token yields
    /// `MapError::Cancelled`.
    async fn fetch(
        &self,
        query: &ProviderQuery,
        token: &CancellationToken,
    ) -> Result<Vec<StationRecord>>;
}

/// Minimal JSON-over-HTTP transport used by the remote providers
#[async_trait]
pub trait JsonTransport: Send + Sync {
    /// Issue a GET with the given query parameters and decode the body as JSON
    async fn get_json(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<serde_json::Value>;
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries pushed out by the capacity bound
    pub evictions: u64,
    /// Entries dropped because they outlived the TTL
    pub expired: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
