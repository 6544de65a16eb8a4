//! Bundled static snapshot, loaded lazily on first use.

use crate::background::cancel::CancellationToken;
use crate::data::normalize::{coordinates, count, identifier, join_address, number, text};
use crate::data::record::{Connector, StationRecord};
use crate::providers::{ocm, ProviderQuery};
use crate::traits::StationProvider;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const SNAPSHOT_SOURCE: &str = "snapshot";

/// Serves records from a JSON file holding either canonical records or raw
/// Open Charge Map POIs. The file is read once; every query filters the
/// in-memory copy to its box.
pub struct SnapshotProvider {
    path: PathBuf,
    records: OnceCell<Arc<Vec<StationRecord>>>,
}

impl SnapshotProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Arc<Vec<StationRecord>>> {
        let records = self
            .records
            .get_or_try_init(|| async {
                let text = tokio::fs::read_to_string(&self.path).await?;
                let body: Value = serde_json::from_str(&text)?;
                let records = normalize_snapshot(&body);
                log::debug!(
                    "{SNAPSHOT_SOURCE}: loaded {} records from {}",
                    records.len(),
                    self.path.display()
                );
                Ok::<_, crate::MapError>(Arc::new(records))
            })
            .await?;
        Ok(records.clone())
    }
}

#[async_trait]
impl StationProvider for SnapshotProvider {
    fn name(&self) -> &str {
        SNAPSHOT_SOURCE
    }

    async fn fetch(
        &self,
        query: &ProviderQuery,
        token: &CancellationToken,
    ) -> Result<Vec<StationRecord>> {
        let all = token.run(self.load()).await?;
        Ok(all
            .iter()
            .filter(|record| query.bounds.contains(&record.position()))
            .take(query.max_results as usize)
            .cloned()
            .collect())
    }
}

/// Accepts a bare array or an object wrapping it under `records`
pub fn normalize_snapshot(body: &Value) -> Vec<StationRecord> {
    let entries = body
        .as_array()
        .or_else(|| body.get("records").and_then(Value::as_array));
    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            if entry.get("AddressInfo").is_some() {
                ocm::normalize_entry(entry, SNAPSHOT_SOURCE)
            } else {
                normalize_canonical(entry)
            }
        })
        .collect()
}

fn normalize_canonical(entry: &Value) -> Option<StationRecord> {
    let first = |names: &[&str]| names.iter().find_map(|name| entry.get(*name));
    let position = coordinates(
        first(&["lat", "latitude"]),
        first(&["lng", "lon", "longitude"]),
    )?;

    let mut record = StationRecord::new(
        identifier(entry.get("id")).unwrap_or_default(),
        position.lat,
        position.lng,
        SNAPSHOT_SOURCE,
    );
    record.name = text(entry.get("name"));
    record.address = text(entry.get("address")).or_else(|| {
        join_address([entry.get("street").and_then(Value::as_str), entry.get("city").and_then(Value::as_str)])
    });
    record.postcode = text(entry.get("postcode"));
    record.connectors_detailed = first(&["connectorsDetailed", "connectors"])
        .and_then(Value::as_array)
        .map(|connectors| {
            connectors
                .iter()
                .map(|c| Connector {
                    kind: text(c.get("type")),
                    power_kw: number(c.get("powerKw").or_else(|| c.get("power_kw"))),
                    quantity: count(c.get("quantity")).filter(|q| *q > 0).unwrap_or(1),
                })
                .collect()
        })
        .unwrap_or_default();
    record.connector_count = count(first(&["connectorCount", "connector_count"]))
        .unwrap_or_else(|| record.connectors_detailed.iter().map(|c| c.quantity).sum());
    Some(record)
}
