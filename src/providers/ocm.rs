//! Open Charge Map, the primary provider.

use crate::background::cancel::CancellationToken;
use crate::core::config::PipelineOptions;
use crate::data::normalize::{coordinates, count, identifier, join_address, number, text};
use crate::data::record::{Connector, StationRecord};
use crate::providers::ProviderQuery;
use crate::traits::{JsonTransport, StationProvider};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const OCM_SOURCE: &str = "ocm";

/// One best-effort retry at a wider radius when a query comes back empty.
///
/// Only the primary provider carries this policy; every other chain member
/// gets exactly one attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidenPolicy {
    pub factor: f64,
    pub max_radius_km: f64,
}

impl WidenPolicy {
    /// Radius for the retry, or `None` when widening would not grow the search
    pub fn widened_radius(&self, radius_km: f64) -> Option<f64> {
        let widened = (radius_km * self.factor).min(self.max_radius_km);
        (widened > radius_km).then_some(widened)
    }
}

pub struct OpenChargeMapProvider {
    base_url: String,
    api_key: Option<String>,
    country_code: Option<String>,
    timeout: Duration,
    widen: Option<WidenPolicy>,
    transport: Arc<dyn JsonTransport>,
}

impl OpenChargeMapProvider {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn JsonTransport>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            country_code: None,
            timeout: Duration::from_millis(crate::constants::DEFAULT_FETCH_TIMEOUT_MS),
            widen: None,
            transport,
        }
    }

    /// Provider configured from pipeline options, widen policy included
    pub fn from_options(options: &PipelineOptions, transport: Arc<dyn JsonTransport>) -> Self {
        let mut provider = Self::new(options.providers.ocm_url.clone(), transport)
            .with_timeout(options.fetch.timeout())
            .with_widen_policy(WidenPolicy {
                factor: options.fetch.widen_factor,
                max_radius_km: options.fetch.max_radius_km,
            });
        provider.api_key = options.providers.ocm_api_key.clone();
        provider.country_code = options.providers.country_code.clone();
        provider
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_country_code(mut self, code: impl Into<String>) -> Self {
        self.country_code = Some(code.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_widen_policy(mut self, policy: WidenPolicy) -> Self {
        self.widen = Some(policy);
        self
    }

    fn common_params(&self, query: &ProviderQuery) -> Vec<(String, String)> {
        let mut params = vec![
            ("output".to_string(), "json".to_string()),
            ("compact".to_string(), "true".to_string()),
            ("verbose".to_string(), "false".to_string()),
            ("maxresults".to_string(), query.max_results.to_string()),
        ];
        if let Some(code) = &self.country_code {
            params.push(("countrycode".to_string(), code.clone()));
        }
        if let Some(kw) = query.filters.min_power_kw {
            params.push(("minpowerkw".to_string(), format!("{kw}")));
        }
        if let Some(key) = &self.api_key {
            params.push(("key".to_string(), key.clone()));
        }
        params
    }

    /// `boundingbox=(lat,lng),(lat,lng)` request for the query box
    pub fn bbox_params(&self, query: &ProviderQuery) -> Vec<(String, String)> {
        let b = &query.bounds;
        let mut params = self.common_params(query);
        params.push((
            "boundingbox".to_string(),
            format!("({},{}),({},{})", b.south, b.west, b.north, b.east),
        ));
        params
    }

    /// Center + radius request, used for the widened retry
    pub fn radius_params(&self, query: &ProviderQuery, radius_km: f64) -> Vec<(String, String)> {
        let center = query.bounds.center();
        let mut params = self.common_params(query);
        params.extend([
            ("latitude".to_string(), format!("{}", center.lat)),
            ("longitude".to_string(), format!("{}", center.lng)),
            ("distance".to_string(), format!("{radius_km:.1}")),
            ("distanceunit".to_string(), "KM".to_string()),
        ]);
        params
    }

    async fn request(
        &self,
        params: &[(String, String)],
        token: &CancellationToken,
    ) -> Result<Vec<StationRecord>> {
        let body = token
            .run(self.transport.get_json(&self.base_url, params, self.timeout))
            .await?;
        Ok(normalize_ocm(&body, OCM_SOURCE))
    }
}

#[async_trait]
impl StationProvider for OpenChargeMapProvider {
    fn name(&self) -> &str {
        OCM_SOURCE
    }

    async fn fetch(
        &self,
        query: &ProviderQuery,
        token: &CancellationToken,
    ) -> Result<Vec<StationRecord>> {
        let records = self.request(&self.bbox_params(query), token).await?;
        if !records.is_empty() {
            return Ok(records);
        }

        let Some(policy) = self.widen.filter(|_| query.allow_widen) else {
            return Ok(records);
        };
        let radius = query.bounds.radius_km();
        let Some(widened) = policy.widened_radius(radius) else {
            return Ok(records);
        };

        log::debug!(
            "{OCM_SOURCE}: empty result, retrying once at {widened:.1} km (was {radius:.1} km)"
        );
        self.request(&self.radius_params(query, widened), token).await
    }
}

/// Maps an OCM POI array into canonical records, dropping malformed entries
pub fn normalize_ocm(body: &Value, source: &str) -> Vec<StationRecord> {
    let Some(entries) = body.as_array() else {
        log::debug!("{source}: response is not an array, ignoring");
        return Vec::new();
    };

    let records: Vec<StationRecord> = entries
        .iter()
        .filter_map(|entry| normalize_entry(entry, source))
        .collect();

    if records.len() < entries.len() {
        log::debug!(
            "{source}: dropped {} malformed entries",
            entries.len() - records.len()
        );
    }
    records
}

pub(crate) fn normalize_entry(entry: &Value, source: &str) -> Option<StationRecord> {
    let address = entry.get("AddressInfo")?;
    let position = coordinates(address.get("Latitude"), address.get("Longitude"))?;

    let id = identifier(entry.get("ID"))
        .map(|id| format!("ocm-{id}"))
        .unwrap_or_default();
    let mut record = StationRecord::new(id, position.lat, position.lng, source);
    record.name = text(address.get("Title"));
    record.address = join_address([
        address.get("AddressLine1").and_then(Value::as_str),
        address.get("AddressLine2").and_then(Value::as_str),
        address.get("Town").and_then(Value::as_str),
    ]);
    record.postcode = text(address.get("Postcode"));

    let connectors: Vec<Connector> = entry
        .get("Connections")
        .and_then(Value::as_array)
        .map(|connections| connections.iter().map(normalize_connection).collect())
        .unwrap_or_default();

    record.connector_count = if connectors.is_empty() {
        count(entry.get("NumberOfPoints")).unwrap_or(0)
    } else {
        connectors.iter().map(|c| c.quantity).sum()
    };
    record.connectors_detailed = connectors;
    Some(record)
}

fn normalize_connection(connection: &Value) -> Connector {
    // Compact responses carry only the reference id, verbose ones the title
    let kind = connection
        .get("ConnectionType")
        .and_then(|kind| text(kind.get("Title")))
        .or_else(|| {
            count(connection.get("ConnectionTypeID"))
                .and_then(connection_type_title)
                .map(str::to_string)
        });

    Connector {
        kind,
        power_kw: number(connection.get("PowerKW")).filter(|kw| *kw > 0.0),
        quantity: count(connection.get("Quantity")).filter(|q| *q > 0).unwrap_or(1),
    }
}

/// Titles of the common OCM connection type reference ids
fn connection_type_title(id: u32) -> Option<&'static str> {
    Some(match id {
        1 => "Type 1 (J1772)",
        2 => "CHAdeMO",
        25 => "Type 2 (Socket Only)",
        27 => "Tesla Supercharger",
        28 => "3-pin Type G (BS1363)",
        32 => "CCS (Type 1)",
        33 => "CCS (Type 2)",
        1036 => "Type 2 (Tethered Connector)",
        _ => return None,
    })
}
