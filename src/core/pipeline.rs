//! The station pipeline: key → cache → provider chain → merge → cache.

use crate::background::cancel::CancellationToken;
use crate::core::bounds::BoundingBox;
use crate::core::config::PipelineOptions;
use crate::core::constants::MAX_TILE_GRID;
use crate::core::viewport::Viewport;
use crate::data::merge::merge_records;
use crate::data::record::StationRecord;
use crate::providers::{ChainOutcome, ProviderChain, ProviderQuery};
use crate::tiles::cache::BoundedCache;
use crate::tiles::grid::{partition, Tile};
use crate::tiles::key::{tile_key, viewport_key};
use crate::traits::CacheStats;
use crate::{MapError, Result};
use futures::future::join_all;
use std::sync::Arc;

/// A cached query result together with the provider that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRecords {
    pub records: Vec<StationRecord>,
    pub source: String,
}

/// The records for one viewport plus how they were obtained
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub records: Vec<StationRecord>,
    /// True when nothing had to be fetched
    pub cache_hit: bool,
    /// Provider name, or several joined with `+` for tiles served by
    /// different providers
    pub source: String,
    /// Number of tiles the viewport was split into (1 when untiled)
    pub tiles: usize,
}

pub struct StationPipeline {
    chain: ProviderChain,
    cache: BoundedCache<Arc<CachedRecords>>,
    options: PipelineOptions,
}

impl StationPipeline {
    pub fn new(
        chain: ProviderChain,
        cache: BoundedCache<Arc<CachedRecords>>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            chain,
            cache,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn cache(&self) -> &BoundedCache<Arc<CachedRecords>> {
        &self.cache
    }

    /// Provider names in attempt order
    pub fn provider_names(&self) -> Vec<String> {
        self.chain.provider_names()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Whether `bounds` is wide enough to be split into the configured grid
    pub fn should_tile(&self, bounds: &BoundingBox) -> bool {
        let keys = &self.options.keys;
        keys.tile_grid > 1
            && (bounds.width() > keys.tile_min_span_deg
                || bounds.height() > keys.tile_min_span_deg)
    }

    /// Loads the records of a viewport, tiling wide boxes per the options
    pub async fn load(&self, viewport: &Viewport, token: &CancellationToken) -> Result<LoadOutcome> {
        let viewport = Viewport {
            bounds: viewport.bounds.normalized()?,
            ..viewport.clone()
        };

        if self.should_tile(&viewport.bounds) {
            self.load_tiled(&viewport, self.options.keys.tile_grid, token)
                .await
        } else {
            self.load_single(&viewport, token).await
        }
    }

    /// Loads the whole viewport under one cache key
    pub async fn load_single(
        &self,
        viewport: &Viewport,
        token: &CancellationToken,
    ) -> Result<LoadOutcome> {
        let key = viewport_key(viewport, self.options.keys.precision);
        if let Some(cached) = self.cache.get(&key) {
            log::debug!("cache hit {key}");
            return Ok(LoadOutcome {
                records: cached.records.clone(),
                cache_hit: true,
                source: cached.source.clone(),
                tiles: 1,
            });
        }
        log::debug!("cache miss {key}");

        let outcome = self.chain.fetch(&self.query(viewport.bounds, viewport), token).await?;
        let cached = self.store(key, outcome, token)?;
        Ok(LoadOutcome {
            records: cached.records.clone(),
            cache_hit: false,
            source: cached.source.clone(),
            tiles: 1,
        })
    }

    /// Splits the viewport into an `n x n` grid (`n` clamped to
    /// `1..=MAX_TILE_GRID`), serves each tile from the cache or a concurrent
    /// chain fetch, and merges the tile lists
    pub async fn load_tiled(
        &self,
        viewport: &Viewport,
        n: u32,
        token: &CancellationToken,
    ) -> Result<LoadOutcome> {
        let n = n.clamp(1, MAX_TILE_GRID);
        let tiles = partition(&viewport.bounds, n, self.options.keys.precision);
        let keys: Vec<String> = tiles
            .iter()
            .map(|tile| tile_key(&tile.hash, &viewport.filters))
            .collect();

        let mut served: Vec<Option<Arc<CachedRecords>>> =
            keys.iter().map(|key| self.cache.get(key)).collect();
        let missing: Vec<usize> = (0..tiles.len()).filter(|&i| served[i].is_none()).collect();
        log::debug!(
            "tiled load: {} of {} tiles cached",
            tiles.len() - missing.len(),
            tiles.len()
        );

        let fetches = missing.iter().map(|&i| self.fetch_tile(&tiles[i], viewport, token));
        for (&i, result) in missing.iter().zip(join_all(fetches).await) {
            served[i] = Some(self.store(keys[i].clone(), result?, token)?);
        }

        let served: Vec<Arc<CachedRecords>> = served.into_iter().flatten().collect();
        let mut sources: Vec<&str> = Vec::new();
        for tile in &served {
            if !sources.contains(&tile.source.as_str()) {
                sources.push(&tile.source);
            }
        }
        let source = sources.join("+");

        let records = self.finish(merge_records(
            served.iter().map(|tile| tile.records.clone()),
            self.options.keys.dedup_precision,
        ));
        Ok(LoadOutcome {
            records,
            cache_hit: missing.is_empty(),
            source,
            tiles: tiles.len(),
        })
    }

    /// Fetches one tile and keeps only the records the tile owns, so a
    /// station on a shared edge is counted by exactly one tile
    async fn fetch_tile(
        &self,
        tile: &Tile,
        viewport: &Viewport,
        token: &CancellationToken,
    ) -> Result<ChainOutcome> {
        let query = self.query(tile.bounds, viewport).without_widen();
        let mut outcome = self.chain.fetch(&query, token).await?;

        let fetched = outcome.records.len();
        outcome.records.retain(|record| tile.owns(&record.position()));
        if outcome.records.len() < fetched {
            log::trace!(
                "tile {},{}: dropped {} records owned by other tiles",
                tile.row,
                tile.col,
                fetched - outcome.records.len()
            );
        }
        Ok(outcome)
    }

    fn query(&self, bounds: BoundingBox, viewport: &Viewport) -> ProviderQuery {
        ProviderQuery::new(
            bounds,
            viewport.filters.clone(),
            self.options.fetch.max_results,
        )
    }

    /// Dedups a fetched result and writes it to the cache, unless the
    /// request was superseded while fetching
    fn store(
        &self,
        key: String,
        outcome: ChainOutcome,
        token: &CancellationToken,
    ) -> Result<Arc<CachedRecords>> {
        if token.is_cancelled() {
            log::trace!("skipping cache write for superseded fetch {key}");
            return Err(MapError::Cancelled);
        }

        let records = self.finish(merge_records(
            [outcome.records],
            self.options.keys.dedup_precision,
        ));
        let cached = Arc::new(CachedRecords {
            records,
            source: outcome.source,
        });
        self.cache.set(key, cached.clone());
        Ok(cached)
    }

    /// Gives every record without a provider id its spatial id
    fn finish(&self, mut records: Vec<StationRecord>) -> Vec<StationRecord> {
        for record in records.iter_mut().filter(|r| r.id.trim().is_empty()) {
            record.id =
                StationRecord::spatial_id(record.lat, record.lng, self.options.keys.dedup_precision);
        }
        records
    }
}
