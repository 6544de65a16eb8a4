//! Pipeline builder for fluent API configuration
//!
//! `PipelineBuilder` resolves a profile into options, applies per-knob
//! overrides, and wires the cache and provider chain into a
//! [`StationPipeline`] (or straight into a [`RequestCoordinator`]).

use crate::{
    background::coordinator::{PipelineEvent, RequestCoordinator},
    core::{
        config::{PipelineOptions, PipelineProfile},
        pipeline::{CachedRecords, StationPipeline},
    },
    providers::{ProviderChain, ReqwestTransport, SyntheticProvider},
    runtime::{spawners::TokioSpawner, AsyncSpawner},
    tiles::cache::BoundedCache,
    traits::{JsonTransport, StationProvider},
    Result,
};
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating and configuring pipelines
pub struct PipelineBuilder {
    /// Options preset
    profile: PipelineProfile,
    /// Overrides applied on top of the resolved profile, in call order
    overrides: Vec<Box<dyn FnOnce(&mut PipelineOptions) + Send>>,
    /// Custom providers replacing the default remote chain
    providers: Vec<Arc<dyn StationProvider>>,
    transport: Option<Arc<dyn JsonTransport>>,
    /// Cache shared with other pipelines
    cache: Option<BoundedCache<Arc<CachedRecords>>>,
    /// Executor for the coordinator's timers and fetches
    spawner: Option<Arc<dyn AsyncSpawner>>,
    read_env: bool,
}

impl PipelineBuilder {
    /// Create a new PipelineBuilder with the balanced profile
    pub fn new() -> Self {
        Self {
            profile: PipelineProfile::default(),
            overrides: Vec::new(),
            providers: Vec::new(),
            transport: None,
            cache: None,
            spawner: None,
            read_env: false,
        }
    }

    /// Set the options preset
    pub fn with_profile(mut self, profile: PipelineProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Use fully custom options
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.profile = PipelineProfile::Custom(options);
        self
    }

    /// Overlay provider settings from the environment at build time
    pub fn with_env(mut self) -> Self {
        self.read_env = true;
        self
    }

    fn override_with(mut self, apply: impl FnOnce(&mut PipelineOptions) + Send + 'static) -> Self {
        self.overrides.push(Box::new(apply));
        self
    }

    /// Decimal places of cache keys
    pub fn with_key_precision(self, precision: u32) -> Self {
        self.override_with(move |options| options.keys.precision = precision)
    }

    /// Grid size for wide boxes; 1 disables tiling
    pub fn with_tile_grid(self, n: u32) -> Self {
        self.override_with(move |options| options.keys.tile_grid = n)
    }

    pub fn with_cache_limits(self, max_entries: usize, ttl: Duration) -> Self {
        self.override_with(move |options| {
            options.cache.max_entries = max_entries;
            options.cache.ttl_secs = ttl.as_secs();
        })
    }

    pub fn with_debounce(self, debounce: Duration) -> Self {
        self.override_with(move |options| {
            options.fetch.debounce_ms = debounce.as_millis() as u64;
        })
    }

    /// Per-provider request timeout
    pub fn with_fetch_timeout(self, timeout: Duration) -> Self {
        self.override_with(move |options| {
            options.fetch.timeout_ms = timeout.as_millis() as u64;
        })
    }

    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.override_with(move |options| options.providers.ocm_api_key = Some(key))
    }

    /// Add a snapshot file to the default chain
    pub fn with_snapshot(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.override_with(move |options| options.providers.snapshot_path = Some(path))
    }

    /// Append a custom provider. Any custom provider replaces the default
    /// remote chain; the synthetic fallback stays last.
    pub fn with_provider(mut self, provider: Arc<dyn StationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Transport for the default remote providers
    pub fn with_transport(mut self, transport: Arc<dyn JsonTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing cache instead of creating one
    pub fn with_shared_cache(mut self, cache: BoundedCache<Arc<CachedRecords>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run the coordinator's debounce timers and fetches on `spawner`
    pub fn with_spawner(mut self, spawner: Arc<dyn AsyncSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    fn resolve(&mut self) -> Result<PipelineOptions> {
        let mut options = self.profile.resolve();
        for apply in self.overrides.drain(..) {
            apply(&mut options);
        }
        if self.read_env {
            options = options.from_env();
        }
        options.validate()?;
        Ok(options)
    }

    /// Build the pipeline with the configured options
    pub fn build(mut self) -> Result<StationPipeline> {
        let options = self.resolve()?;

        let chain = if self.providers.is_empty() {
            let transport = self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport));
            ProviderChain::from_options(&options, transport)
        } else {
            let fallback = Arc::new(SyntheticProvider::new(options.providers.synthetic_count));
            self.providers.into_iter().fold(
                ProviderChain::new(fallback).with_timeout(options.fetch.timeout()),
                ProviderChain::with_provider,
            )
        };

        let cache = self.cache.unwrap_or_else(|| {
            BoundedCache::new(options.cache.max_entries, options.cache.ttl())
                .with_refresh_on_read(options.cache.refresh_on_read)
        });

        log::debug!("pipeline chain: {}", chain.provider_names().join(" -> "));
        Ok(StationPipeline::new(chain, cache, options))
    }

    /// Build the pipeline and a coordinator driving it.
    ///
    /// Without [`with_spawner`](Self::with_spawner) the coordinator spawns on
    /// the Tokio runtime this is called from, and building outside one fails
    /// with `MapError::Config`.
    pub fn build_coordinator(mut self) -> Result<(RequestCoordinator, Receiver<PipelineEvent>)> {
        let spawner = match self.spawner.take() {
            Some(spawner) => spawner,
            None => Arc::new(TokioSpawner::current()?),
        };
        Ok(RequestCoordinator::new(Arc::new(self.build()?), spawner))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
