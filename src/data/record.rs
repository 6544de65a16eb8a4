use crate::core::geo::{round_to, LatLng};
use serde::{Deserialize, Serialize};

/// Power threshold (kW) above which a DC connector counts as rapid
const FAST_DC_KW: f64 = 43.0;

/// A single connector (or group of identical connectors) on a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    /// Connector type title, e.g. "Type 2 (Socket Only)"
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_kw: Option<f64>,
    pub quantity: u32,
}

impl Connector {
    pub fn new(kind: Option<&str>, power_kw: Option<f64>, quantity: u32) -> Self {
        Self {
            kind: kind.map(str::to_string),
            power_kw,
            quantity,
        }
    }

    fn is_fast_dc(&self) -> bool {
        let dc_kind = self.kind.as_deref().is_some_and(|kind| {
            let kind = kind.to_lowercase();
            kind.contains("ccs") || kind.contains("chademo") || kind.contains("tesla")
        });
        dc_kind && self.power_kw.is_some_and(|kw| kw >= FAST_DC_KW)
    }
}

/// Canonical charging station record every provider is normalized into.
///
/// `lat` and `lng` are always finite and inside the WGS84 domain: the
/// normalizers drop anything else before a record is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRecord {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    pub connector_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connectors_detailed: Vec<Connector>,
    pub source: String,
    /// How many raw records were merged into this one
    #[serde(default = "default_match_count")]
    pub match_count: u32,
}

fn default_match_count() -> u32 {
    1
}

impl StationRecord {
    pub fn new(id: impl Into<String>, lat: f64, lng: f64, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
            name: None,
            address: None,
            postcode: None,
            connector_count: 0,
            connectors_detailed: Vec::new(),
            source: source.into(),
            match_count: 1,
        }
    }

    /// Identifier used when a provider has none: the position rounded to
    /// `precision` decimals
    pub fn spatial_id(lat: f64, lng: f64, precision: u32) -> String {
        let precision = precision as usize;
        format!(
            "@{:.*},{:.*}",
            precision,
            round_to(lat, precision as u32),
            precision,
            round_to(lng, precision as u32)
        )
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    /// Highest advertised connector power, if any
    pub fn max_power_kw(&self) -> Option<f64> {
        self.connectors_detailed
            .iter()
            .filter_map(|connector| connector.power_kw)
            .fold(None, |max, kw| Some(max.map_or(kw, |m: f64| m.max(kw))))
    }

    /// Feature set consumed by the station scoring endpoint
    pub fn feature_vector(&self) -> StationFeatures {
        StationFeatures {
            power_kw: self.max_power_kw().unwrap_or(0.0),
            n_connectors: self.connector_count,
            has_fast_dc: u8::from(self.connectors_detailed.iter().any(Connector::is_fast_dc)),
            has_geo: u8::from(self.position().is_valid()),
        }
    }
}

/// Scoring payload keyed by record identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationFeatures {
    pub power_kw: f64,
    pub n_connectors: u32,
    pub has_fast_dc: u8,
    pub has_geo: u8,
}
