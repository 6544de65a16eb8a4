//! Configuration system for the station pipeline
//!
//! Options are grouped per concern (cache, keys, fetching, providers) and
//! can be produced from presets through [`PipelineProfile`], loaded from a
//! JSON file, or overlaid with environment variables.

use crate::core::constants::*;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PipelineProfile {
    #[default]
    Balanced,
    /// Fewer, larger requests and a longer-lived cache
    LowBandwidth,
    /// Finer tiling for wide-area views against providers with low result caps
    WideArea,
    Custom(PipelineOptions),
}

impl PipelineProfile {
    pub fn resolve(&self) -> PipelineOptions {
        match self {
            Self::Balanced => PipelineOptions::default(),
            Self::LowBandwidth => PipelineOptions {
                cache: CacheConfig {
                    max_entries: 1024,
                    ttl_secs: 1800,
                    refresh_on_read: true,
                },
                keys: KeyConfig {
                    precision: 2,
                    tile_grid: 1,
                    ..KeyConfig::default()
                },
                fetch: FetchConfig {
                    debounce_ms: 600,
                    ..FetchConfig::default()
                },
                providers: ProviderConfig::default(),
            },
            Self::WideArea => PipelineOptions {
                cache: CacheConfig {
                    max_entries: 512,
                    ..CacheConfig::default()
                },
                keys: KeyConfig {
                    tile_grid: 4,
                    tile_min_span_deg: 0.25,
                    ..KeyConfig::default()
                },
                fetch: FetchConfig {
                    max_results: 250,
                    ..FetchConfig::default()
                },
                providers: ProviderConfig::default(),
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineOptions {
    pub cache: CacheConfig,
    pub keys: KeyConfig,
    pub fetch: FetchConfig,
    pub providers: ProviderConfig,
}

impl PipelineOptions {
    /// Load options from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&text)?;
        options.validate()?;
        Ok(options)
    }

    /// Overlay `OCM_API_KEY`, `CHARGEMAP_SNAPSHOT` and `CHARGEMAP_OVERPASS_URL`
    pub fn from_env(self) -> Self {
        self.with_env(|name| std::env::var(name).ok())
    }

    fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_empty("OCM_API_KEY") {
            self.providers.ocm_api_key = Some(key);
        }
        if let Some(path) = non_empty("CHARGEMAP_SNAPSHOT") {
            self.providers.snapshot_path = Some(PathBuf::from(path));
        }
        if let Some(url) = non_empty("CHARGEMAP_OVERPASS_URL") {
            self.providers.overpass_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(MapError::Config("cache.max_entries must be at least 1".into()));
        }
        if self.keys.tile_grid == 0 {
            return Err(MapError::Config("keys.tile_grid must be at least 1".into()));
        }
        if self.keys.tile_grid > MAX_TILE_GRID {
            return Err(MapError::Config(format!(
                "keys.tile_grid is capped at {MAX_TILE_GRID}, got {}",
                self.keys.tile_grid
            )));
        }
        if self.keys.precision > 10 || self.keys.dedup_precision > 10 {
            return Err(MapError::Config("key precision is capped at 10 decimals".into()));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(MapError::Config("fetch.timeout_ms must be positive".into()));
        }
        if !(self.fetch.search_radius_km.is_finite() && self.fetch.search_radius_km > 0.0) {
            return Err(MapError::Config("fetch.search_radius_km must be positive".into()));
        }
        if !(self.fetch.widen_factor.is_finite() && self.fetch.widen_factor >= 1.0) {
            return Err(MapError::Config("fetch.widen_factor must be at least 1.0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
    /// Bump the entry timestamp on every hit (sliding expiry)
    pub refresh_on_read: bool,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_ENTRIES,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            refresh_on_read: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Decimal places of cache keys and tile hashes
    pub precision: u32,
    /// `n` of the `n x n` tile grid; 1 disables tiling
    pub tile_grid: u32,
    /// Minimum span (degrees, either axis) before a box is tiled
    pub tile_min_span_deg: f64,
    /// Decimal places of the spatial dedup key
    pub dedup_precision: u32,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_KEY_PRECISION,
            tile_grid: DEFAULT_TILE_GRID,
            tile_min_span_deg: DEFAULT_TILE_MIN_SPAN_DEG,
            dedup_precision: DEFAULT_DEDUP_PRECISION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub debounce_ms: u64,
    pub search_radius_km: f64,
    pub widen_factor: f64,
    pub max_radius_km: f64,
    pub max_results: u32,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            search_radius_km: DEFAULT_SEARCH_RADIUS_KM,
            widen_factor: DEFAULT_WIDEN_FACTOR,
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub ocm_url: String,
    pub ocm_api_key: Option<String>,
    pub country_code: Option<String>,
    pub overpass_url: String,
    pub snapshot_path: Option<PathBuf>,
    pub synthetic_count: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            ocm_url: OCM_API_URL.to_string(),
            ocm_api_key: None,
            country_code: None,
            overpass_url: OVERPASS_API_URL.to_string(),
            snapshot_path: None,
            synthetic_count: DEFAULT_SYNTHETIC_COUNT,
        }
    }
}
