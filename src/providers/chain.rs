use crate::background::cancel::CancellationToken;
use crate::core::config::PipelineOptions;
use crate::data::record::StationRecord;
use crate::providers::{
    OpenChargeMapProvider, OverpassProvider, ProviderQuery, ReqwestTransport, SnapshotProvider,
    SyntheticProvider,
};
use crate::traits::{JsonTransport, StationProvider};
use crate::{MapError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Records produced by the first provider that had any, plus its name
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub records: Vec<StationRecord>,
    pub source: String,
    /// Providers that failed or came back empty before `source` answered
    pub skipped: Vec<String>,
}

/// Ordered fallback over unreliable providers.
///
/// Each provider gets one attempt under the chain timeout. Timeouts,
/// transport failures and empty (or fully filtered out) results advance to
/// the next provider; the synthetic fallback always runs last, under the
/// same timeout, and its failure is `ChainExhausted`. Only cancellation
/// stops the walk early.
pub struct ProviderChain {
    providers: Vec<Arc<dyn StationProvider>>,
    fallback: Arc<dyn StationProvider>,
    timeout: Duration,
}

impl ProviderChain {
    /// Creates a chain with no remote providers, only the fallback
    pub fn new(fallback: Arc<dyn StationProvider>) -> Self {
        Self {
            providers: Vec::new(),
            fallback,
            timeout: Duration::from_millis(crate::constants::DEFAULT_FETCH_TIMEOUT_MS),
        }
    }

    /// The standard chain: Open Charge Map, Overpass, the snapshot when one
    /// is configured, then synthetic data
    pub fn from_options(options: &PipelineOptions, transport: Arc<dyn JsonTransport>) -> Self {
        let fallback = Arc::new(SyntheticProvider::new(options.providers.synthetic_count));
        let mut chain = Self::new(fallback)
            .with_timeout(options.fetch.timeout())
            .with_provider(Arc::new(OpenChargeMapProvider::from_options(
                options,
                transport.clone(),
            )))
            .with_provider(Arc::new(
                OverpassProvider::new(options.providers.overpass_url.clone(), transport)
                    .with_timeout(options.fetch.timeout()),
            ));
        if let Some(path) = &options.providers.snapshot_path {
            chain = chain.with_provider(Arc::new(SnapshotProvider::new(path.clone())));
        }
        chain
    }

    /// [`from_options`](Self::from_options) over the shared reqwest client
    pub fn with_http(options: &PipelineOptions) -> Self {
        Self::from_options(options, Arc::new(ReqwestTransport))
    }

    pub fn with_provider(mut self, provider: Arc<dyn StationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Names in attempt order, fallback last
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(|provider| provider.name().to_string())
            .collect()
    }

    pub async fn fetch(
        &self,
        query: &ProviderQuery,
        token: &CancellationToken,
    ) -> Result<ChainOutcome> {
        let mut skipped = Vec::new();

        for provider in self
            .providers
            .iter()
            .filter(|provider| query.filters.source.allows(provider.name()))
        {
            token.check()?;
            let name = provider.name().to_string();
            log::debug!("trying provider {name}");

            match self.attempt(provider.as_ref(), query, token).await {
                Ok(records) => {
                    return Ok(ChainOutcome {
                        records,
                        source: name,
                        skipped,
                    })
                }
                Err(MapError::Cancelled) => return Err(MapError::Cancelled),
                Err(err @ MapError::EmptyResult(_)) => log::debug!("{err}, advancing"),
                Err(err) => log::warn!("provider {name} failed: {err}"),
            }
            skipped.push(name);
        }

        token.check()?;
        let records = match self.attempt(self.fallback.as_ref(), query, token).await {
            Ok(records) => records,
            Err(MapError::Cancelled) => return Err(MapError::Cancelled),
            Err(err) => {
                log::warn!("fallback {} failed: {err}", self.fallback.name());
                return Err(MapError::ChainExhausted);
            }
        };
        if !skipped.is_empty() {
            log::info!(
                "serving {} {} records after {} failed",
                records.len(),
                self.fallback.name(),
                skipped.join(", ")
            );
        }
        Ok(ChainOutcome {
            records,
            source: self.fallback.name().to_string(),
            skipped,
        })
    }

    /// One timed provider call; empty or fully filtered results become
    /// `EmptyResult`
    async fn attempt(
        &self,
        provider: &dyn StationProvider,
        query: &ProviderQuery,
        token: &CancellationToken,
    ) -> Result<Vec<StationRecord>> {
        let records = tokio::time::timeout(self.timeout, provider.fetch(query, token))
            .await
            .map_err(|_| MapError::ProviderUnavailable {
                provider: provider.name().to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            })??;

        let records = query.retain_matching(records);
        if records.is_empty() {
            return Err(MapError::EmptyResult(provider.name().to_string()));
        }
        Ok(records)
    }
}
