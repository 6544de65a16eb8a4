use crate::core::bounds::BoundingBox;
use crate::core::geo::LatLng;
use crate::data::record::StationRecord;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which providers a query may use
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceSelector {
    /// Walk the whole provider chain
    #[default]
    Auto,
    /// Only the named provider, still backed by the synthetic fallback
    Only(String),
}

impl SourceSelector {
    pub fn allows(&self, provider: &str) -> bool {
        match self {
            Self::Auto => true,
            Self::Only(name) => name.eq_ignore_ascii_case(provider),
        }
    }
}

impl fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Only(name) => write!(f, "{}", name.to_ascii_lowercase()),
        }
    }
}

/// Active filters of a viewport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilterSet {
    /// Case-insensitive connector type keyword, e.g. "type 2" or "ccs"
    pub connector: Option<String>,
    /// Minimum connector power in kW
    pub min_power_kw: Option<f64>,
    #[serde(default)]
    pub source: SourceSelector,
}

impl FilterSet {
    pub fn with_connector(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        self.connector = (!keyword.trim().is_empty()).then(|| keyword.trim().to_string());
        self
    }

    pub fn with_min_power(mut self, kw: f64) -> Self {
        self.min_power_kw = (kw.is_finite() && kw > 0.0).then_some(kw);
        self
    }

    pub fn with_source(mut self, source: SourceSelector) -> Self {
        self.source = source;
        self
    }

    /// True when no record-level filter is set
    pub fn is_unfiltered(&self) -> bool {
        self.connector.is_none() && self.min_power_kw.is_none()
    }

    /// Checks a record against the connector keyword and power threshold.
    ///
    /// Both filters need at least one detailed connector satisfying them, so
    /// a record without connector details only passes an unfiltered set.
    pub fn matches(&self, record: &StationRecord) -> bool {
        if self.is_unfiltered() {
            return true;
        }

        let keyword = self.connector.as_deref().map(str::to_lowercase);
        record.connectors_detailed.iter().any(|connector| {
            let keyword_ok = keyword.as_deref().map_or(true, |keyword| {
                connector
                    .kind
                    .as_deref()
                    .is_some_and(|kind| kind.to_lowercase().contains(keyword))
            });
            let power_ok = self
                .min_power_kw
                .map_or(true, |min| connector.power_kw.is_some_and(|kw| kw >= min));
            keyword_ok && power_ok
        })
    }

    /// Stable text form appended to cache keys
    pub fn key_suffix(&self) -> String {
        let connector = self
            .connector
            .as_deref()
            .map(|c| c.to_lowercase())
            .unwrap_or_default();
        let power = self
            .min_power_kw
            .map(|kw| format!("{kw}"))
            .unwrap_or_default();
        format!("c={connector}|p={power}|s={}", self.source)
    }
}

/// The geographic rectangle visible to the user plus its active filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub bounds: BoundingBox,
    pub zoom: Option<u8>,
    #[serde(default)]
    pub filters: FilterSet,
}

impl Viewport {
    /// Creates a new unfiltered viewport
    pub fn new(bounds: BoundingBox) -> Self {
        Self {
            bounds,
            zoom: None,
            filters: FilterSet::default(),
        }
    }

    /// Creates the viewport for a point + radius query (e.g. a geocoder hit)
    pub fn around(center: LatLng, radius_km: f64) -> Result<Self> {
        Ok(Self::new(BoundingBox::from_center_radius(center, radius_km)?))
    }

    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub fn center(&self) -> LatLng {
        self.bounds.center()
    }
}
