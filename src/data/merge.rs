use crate::data::record::StationRecord;
use crate::prelude::HashMap;

/// Key a record is deduplicated on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Id(String),
    Spatial(String),
}

impl DedupKey {
    fn of(record: &StationRecord, precision: u32) -> Self {
        if record.id.trim().is_empty() {
            Self::Spatial(StationRecord::spatial_id(record.lat, record.lng, precision))
        } else {
            Self::Id(record.id.clone())
        }
    }
}

/// Combines per-tile record lists into one identity-deduplicated list.
///
/// Records collide on `id`, or on their position rounded to
/// `spatial_precision` decimals when the provider gave no id. Colliding
/// records are merged: connector counts are summed, the first non-empty
/// `name`/`address`/`postcode`/connector details are kept and `match_count`
/// accumulates. Output order is the order of first occurrence.
pub fn merge_records<I>(lists: I, spatial_precision: u32) -> Vec<StationRecord>
where
    I: IntoIterator<Item = Vec<StationRecord>>,
{
    let mut merged: Vec<StationRecord> = Vec::new();
    let mut index: HashMap<DedupKey, usize> = HashMap::default();

    for record in lists.into_iter().flatten() {
        let key = DedupKey::of(&record, spatial_precision);
        match index.get(&key) {
            Some(&slot) => absorb(&mut merged[slot], record),
            None => {
                index.insert(key, merged.len());
                merged.push(record);
            }
        }
    }

    merged
}

fn absorb(target: &mut StationRecord, other: StationRecord) {
    target.connector_count = target.connector_count.saturating_add(other.connector_count);
    target.match_count = target.match_count.saturating_add(other.match_count);

    if target.name.is_none() {
        target.name = other.name;
    }
    if target.address.is_none() {
        target.address = other.address;
    }
    if target.postcode.is_none() {
        target.postcode = other.postcode;
    }
    if target.connectors_detailed.is_empty() {
        target.connectors_detailed = other.connectors_detailed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, lat: f64, lng: f64, connectors: u32) -> StationRecord {
        let mut record = StationRecord::new(id, lat, lng, "test");
        record.connector_count = connectors;
        record
    }

    #[test]
    fn test_merge_sums_connector_counts() {
        let merged = merge_records(
            vec![vec![record("1", 0.0, 0.0, 2)], vec![record("1", 0.0, 0.0, 3)]],
            4,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "1");
        assert_eq!(merged[0].lat, 0.0);
        assert_eq!(merged[0].lng, 0.0);
        assert_eq!(merged[0].connector_count, 5);
        assert_eq!(merged[0].match_count, 2);
    }

    #[test]
    fn test_merge_keeps_first_non_empty_fields() {
        let mut first = record("7", 1.0, 1.0, 1);
        first.address = Some("1 High St".into());
        let mut second = record("7", 1.0, 1.0, 1);
        second.name = Some("Depot".into());
        second.address = Some("2 Low Rd".into());

        let merged = merge_records(vec![vec![first], vec![second]], 4);
        assert_eq!(merged[0].name.as_deref(), Some("Depot"));
        assert_eq!(merged[0].address.as_deref(), Some("1 High St"));
    }

    #[test]
    fn test_records_without_id_collapse_spatially() {
        let a = record("", 51.50001, -0.12781, 1);
        let b = record("", 51.50004, -0.12779, 2);
        let far = record("", 51.6, -0.12781, 1);

        let merged = merge_records(vec![vec![a, far], vec![b]], 4);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].connector_count, 3);
        assert_eq!(merged[1].lat, 51.6);
    }

    #[test]
    fn test_preserves_first_occurrence_order() {
        let merged = merge_records(
            vec![
                vec![record("b", 0.0, 0.0, 1), record("a", 0.0, 0.0, 1)],
                vec![record("c", 0.0, 0.0, 1), record("b", 0.0, 0.0, 1)],
            ],
            4,
        );
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_single_list_passthrough() {
        let merged = merge_records(vec![vec![record("1", 0.0, 0.0, 1)]], 4);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].match_count, 1);
        assert!(merge_records(Vec::<Vec<StationRecord>>::new(), 4).is_empty());
    }
}
