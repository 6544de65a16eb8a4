//! OpenStreetMap charging stations through the Overpass API.

use crate::background::cancel::CancellationToken;
use crate::core::bounds::BoundingBox;
use crate::data::normalize::{coordinates, count, identifier, join_address, number, text};
use crate::data::record::{Connector, StationRecord};
use crate::providers::ProviderQuery;
use crate::traits::{JsonTransport, StationProvider};
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub const OVERPASS_SOURCE: &str = "osm";

pub struct OverpassProvider {
    base_url: String,
    timeout: Duration,
    transport: Arc<dyn JsonTransport>,
}

impl OverpassProvider {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn JsonTransport>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_millis(crate::constants::DEFAULT_FETCH_TIMEOUT_MS),
            transport,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overpass QL for charging station nodes inside `bounds`
    pub fn build_query(bounds: &BoundingBox, max_results: u32) -> String {
        // the server-side timeout is whole seconds and must not undercut ours
        format!(
            "[out:json][timeout:25];node[\"amenity\"=\"charging_station\"]({},{},{},{});out body {};",
            bounds.south, bounds.west, bounds.north, bounds.east, max_results
        )
    }
}

#[async_trait]
impl StationProvider for OverpassProvider {
    fn name(&self) -> &str {
        OVERPASS_SOURCE
    }

    async fn fetch(
        &self,
        query: &ProviderQuery,
        token: &CancellationToken,
    ) -> Result<Vec<StationRecord>> {
        let params = vec![(
            "data".to_string(),
            Self::build_query(&query.bounds, query.max_results),
        )];
        let body = token
            .run(self.transport.get_json(&self.base_url, &params, self.timeout))
            .await?;
        Ok(normalize_overpass(&body))
    }
}

/// Maps an Overpass `elements` payload into canonical records
pub fn normalize_overpass(body: &Value) -> Vec<StationRecord> {
    body.get("elements")
        .and_then(Value::as_array)
        .map(|elements| elements.iter().filter_map(normalize_element).collect())
        .unwrap_or_default()
}

fn normalize_element(element: &Value) -> Option<StationRecord> {
    // ways and relations only carry a position with `out center`
    let position = coordinates(element.get("lat"), element.get("lon")).or_else(|| {
        let center = element.get("center")?;
        coordinates(center.get("lat"), center.get("lon"))
    })?;

    let kind = text(element.get("type")).unwrap_or_else(|| "node".to_string());
    let id = identifier(element.get("id"))
        .map(|id| format!("osm-{kind}-{id}"))
        .unwrap_or_default();

    let empty = Map::new();
    let tags = element.get("tags").and_then(Value::as_object).unwrap_or(&empty);
    let tag = |name: &str| tags.get(name).and_then(Value::as_str);

    let mut record = StationRecord::new(id, position.lat, position.lng, OVERPASS_SOURCE);
    record.name = text(tags.get("name")).or_else(|| text(tags.get("operator")));
    let street = match (tag("addr:housenumber"), tag("addr:street")) {
        (Some(number), Some(street)) => Some(format!("{number} {street}")),
        (None, street) => street.map(str::to_string),
        (Some(_), None) => None,
    };
    record.address = join_address([street.as_deref(), tag("addr:city")]);
    record.postcode = text(tags.get("addr:postcode"));

    let connectors = socket_connectors(tags);
    let socket_total: u32 = connectors.iter().map(|c| c.quantity).sum();
    record.connector_count = if socket_total > 0 {
        socket_total
    } else {
        count(tags.get("capacity")).unwrap_or(0)
    };
    record.connectors_detailed = connectors;
    Some(record)
}

/// Reads `socket:<type>=<count>` and `socket:<type>:output=<power>` tag pairs
fn socket_connectors(tags: &Map<String, Value>) -> Vec<Connector> {
    tags.iter()
        .filter_map(|(key, value)| {
            let socket = key.strip_prefix("socket:")?;
            if socket.contains(':') {
                return None;
            }
            // "yes" marks a socket of unknown count
            let quantity = count(Some(value)).unwrap_or(1);
            if quantity == 0 {
                return None;
            }
            let power_kw = tags
                .get(&format!("socket:{socket}:output"))
                .and_then(Value::as_str)
                .and_then(parse_power_kw);
            Some(Connector {
                kind: Some(socket_title(socket)),
                power_kw,
                quantity,
            })
        })
        .collect()
}

fn socket_title(socket: &str) -> String {
    match socket {
        "type1" => "Type 1 (J1772)",
        "type1_combo" => "CCS (Type 1)",
        "type2" => "Type 2 (Socket Only)",
        "type2_cable" => "Type 2 (Tethered Connector)",
        "type2_combo" => "CCS (Type 2)",
        "chademo" => "CHAdeMO",
        "tesla_supercharger" => "Tesla Supercharger",
        "bs1363" => "3-pin Type G (BS1363)",
        other => other,
    }
    .to_string()
}

/// Parses "22 kW", "50kW" or "7400 W" into kilowatts
fn parse_power_kw(raw: &str) -> Option<f64> {
    let raw = raw.trim().to_lowercase();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (value, unit) = raw.split_at(split);
    let value = number(Some(&Value::String(value.to_string())))?;
    let kw = match unit.trim() {
        "w" => value / 1000.0,
        "mw" => value * 1000.0,
        _ => value,
    };
    (kw > 0.0).then_some(kw)
}
