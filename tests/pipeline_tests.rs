use async_trait::async_trait;
use chargemap::prelude::*;
use serde_json::{json, Value};
use std::io::Write;

/// End-to-end pipeline scenarios over scripted upstreams
#[cfg(test)]
mod pipeline_tests {
    use super::*;

    const OCM_URL: &str = "http://ocm.test/poi";
    const OVERPASS_URL: &str = "http://overpass.test/interpreter";

    #[derive(Clone)]
    enum Reply {
        Body(Value),
        Status(u16),
        Hang,
    }

    /// Answers per endpoint URL and counts calls
    struct ScriptedTransport {
        replies: HashMap<String, Reply>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<(&str, Reply)>) -> Arc<Self> {
            Arc::new(Self {
                replies: replies
                    .into_iter()
                    .map(|(url, reply)| (url.to_string(), reply))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    #[async_trait]
    impl JsonTransport for ScriptedTransport {
        async fn get_json(
            &self,
            url: &str,
            _params: &[(String, String)],
            _timeout: Duration,
        ) -> chargemap::Result<Value> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.replies.get(url).cloned().unwrap_or(Reply::Status(404)) {
                Reply::Body(body) => Ok(body),
                Reply::Status(code) => Err(MapError::ProviderUnavailable {
                    provider: url.to_string(),
                    reason: format!("HTTP {code}"),
                }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(json!([]))
                }
            }
        }
    }

    fn options() -> PipelineOptions {
        let mut options = PipelineOptions::default();
        options.providers.ocm_url = OCM_URL.to_string();
        options.providers.overpass_url = OVERPASS_URL.to_string();
        options.providers.synthetic_count = 6;
        options.keys.tile_grid = 1;
        options
    }

    fn pipeline(transport: Arc<ScriptedTransport>, options: PipelineOptions) -> StationPipeline {
        PipelineBuilder::new()
            .with_options(options)
            .with_transport(transport)
            .build()
            .unwrap()
    }

    fn london() -> Viewport {
        Viewport::new("-0.15,51.49,-0.10,51.52".parse().unwrap())
    }

    fn ocm_poi(id: u64, lat: Value) -> Value {
        json!({
            "ID": id,
            "AddressInfo": {"Title": format!("POI {id}"), "Latitude": lat, "Longitude": -0.12},
            "Connections": [{"ConnectionType": {"Title": "CCS (Type 2)"}, "PowerKW": 150, "Quantity": 2}]
        })
    }

    /// A malformed latitude is dropped, the valid record survives
    #[tokio::test]
    async fn test_malformed_record_filtering() {
        let transport = ScriptedTransport::new(vec![(
            OCM_URL,
            Reply::Body(json!([ocm_poi(1, json!("not-a-number")), ocm_poi(2, json!(51.5))])),
        )]);
        let pipeline = pipeline(transport, options());

        let outcome = pipeline.load(&london(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.source, "ocm");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].id, "ocm-2");
        assert_eq!(outcome.records[0].connector_count, 2);
    }

    /// Primary always times out, secondary answers `[]`: synthetic data
    #[tokio::test(start_paused = true)]
    async fn test_fallback_chain_scenario() {
        let transport = ScriptedTransport::new(vec![
            (OCM_URL, Reply::Hang),
            (OVERPASS_URL, Reply::Body(json!({"elements": []}))),
        ]);
        let pipeline = pipeline(transport.clone(), options());

        let outcome = pipeline.load(&london(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.source, "synthetic");
        assert_eq!(outcome.records.len(), 6);
        assert_eq!(transport.calls_to(OCM_URL), 1);
        assert_eq!(transport.calls_to(OVERPASS_URL), 1);

        let bounds = london().bounds;
        assert!(outcome
            .records
            .iter()
            .all(|record| bounds.contains(&record.position())));
    }

    /// Widening only ever happens on the primary provider
    #[tokio::test]
    async fn test_widen_retry_is_primary_only() {
        let transport = ScriptedTransport::new(vec![
            (OCM_URL, Reply::Body(json!([]))),
            (OVERPASS_URL, Reply::Body(json!({"elements": []}))),
        ]);
        let pipeline = pipeline(transport.clone(), options());

        let outcome = pipeline.load(&london(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.source, "synthetic");
        assert_eq!(transport.calls_to(OCM_URL), 2);
        assert_eq!(transport.calls_to(OVERPASS_URL), 1);
    }

    /// Remote failures fall through to the bundled snapshot
    #[tokio::test]
    async fn test_snapshot_serves_when_remotes_fail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "snap-1", "lat": 51.50, "lng": -0.12, "name": "Snapshot site", "connectorCount": 4}}]"#
        )
        .unwrap();

        let transport = ScriptedTransport::new(vec![
            (OCM_URL, Reply::Status(503)),
            (OVERPASS_URL, Reply::Status(429)),
        ]);
        let mut options = options();
        options.providers.snapshot_path = Some(file.path().to_path_buf());
        let pipeline = pipeline(transport, options);

        let outcome = pipeline.load(&london(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.source, "snapshot");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].name.as_deref(), Some("Snapshot site"));
    }

    /// Second load of the same (jittered) viewport is a cache hit
    #[tokio::test]
    async fn test_cache_hit_after_fetch() {
        let transport = ScriptedTransport::new(vec![(
            OCM_URL,
            Reply::Body(json!([ocm_poi(2, json!(51.5))])),
        )]);
        let pipeline = pipeline(transport.clone(), options());
        let token = CancellationToken::new();

        let first = pipeline.load(&london(), &token).await.unwrap();
        let jittered = Viewport::new("-0.15001,51.49002,-0.10,51.52".parse().unwrap());
        let second = pipeline.load(&jittered, &token).await.unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(second.source, "ocm");
        assert_eq!(second.records, first.records);
        assert_eq!(transport.calls_to(OCM_URL), 1);

        let stats = pipeline.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
    }

    /// Cached entries expire after the TTL and are fetched again
    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_refetches() {
        let transport = ScriptedTransport::new(vec![(
            OCM_URL,
            Reply::Body(json!([ocm_poi(2, json!(51.5))])),
        )]);
        let mut options = options();
        options.cache.ttl_secs = 60;
        let pipeline = pipeline(transport.clone(), options);
        let token = CancellationToken::new();

        pipeline.load(&london(), &token).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let again = pipeline.load(&london(), &token).await.unwrap();

        assert!(!again.cache_hit);
        assert_eq!(transport.calls_to(OCM_URL), 2);
    }

    /// Wide boxes are split into tiles; a POI every tile returns is kept once
    #[tokio::test]
    async fn test_wide_box_is_tiled_and_deduplicated() {
        let transport = ScriptedTransport::new(vec![(
            OCM_URL,
            Reply::Body(json!([ocm_poi(2, json!(51.5))])),
        )]);
        let mut options = options();
        options.keys.tile_grid = 2;
        options.keys.tile_min_span_deg = 0.5;
        let pipeline = pipeline(transport.clone(), options);

        let wide = Viewport::new("-1.0,51.0,0.0,52.0".parse().unwrap());
        let outcome = pipeline.load(&wide, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.tiles, 4);
        assert_eq!(transport.calls_to(OCM_URL), 4);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].match_count, 1);
        assert_eq!(outcome.records[0].connector_count, 2);
    }

    /// A station on the corner shared by all tiles is counted once
    #[tokio::test]
    async fn test_station_on_tile_edge_is_not_inflated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "s1", "lat": 51.5, "lng": -0.5, "connectorCount": 2}},
               {{"id": "s2", "lat": 51.25, "lng": -0.5, "connectorCount": 1}}]"#
        )
        .unwrap();

        let transport = ScriptedTransport::new(vec![
            (OCM_URL, Reply::Status(503)),
            (OVERPASS_URL, Reply::Status(503)),
        ]);
        let mut options = options();
        options.keys.tile_grid = 2;
        options.keys.tile_min_span_deg = 0.5;
        options.providers.snapshot_path = Some(file.path().to_path_buf());
        let pipeline = pipeline(transport, options);

        let wide = Viewport::new("-1.0,51.0,0.0,52.0".parse().unwrap());
        let outcome = pipeline.load(&wide, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.tiles, 4);
        assert_eq!(outcome.records.len(), 2);
        for record in &outcome.records {
            assert_eq!(record.match_count, 1, "{}", record.id);
        }
        let s1 = outcome.records.iter().find(|r| r.id == "s1").unwrap();
        assert_eq!(s1.connector_count, 2);
        let s2 = outcome.records.iter().find(|r| r.id == "s2").unwrap();
        assert_eq!(s2.connector_count, 1);
    }

    /// Tile sub-fetches never widen past their own tile
    #[tokio::test]
    async fn test_tiles_skip_widen_retry() {
        let transport = ScriptedTransport::new(vec![
            (OCM_URL, Reply::Body(json!([]))),
            (OVERPASS_URL, Reply::Body(json!({"elements": []}))),
        ]);
        let mut options = options();
        options.keys.tile_grid = 2;
        options.keys.tile_min_span_deg = 0.5;
        let pipeline = pipeline(transport.clone(), options);

        let wide = Viewport::new("-1.0,51.0,0.0,52.0".parse().unwrap());
        let outcome = pipeline.load(&wide, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.source, "synthetic");
        assert_eq!(transport.calls_to(OCM_URL), 4);
        assert_eq!(transport.calls_to(OVERPASS_URL), 4);
    }

    /// Untiled by default, even for a wide box
    #[tokio::test]
    async fn test_default_options_do_not_tile() {
        let transport = ScriptedTransport::new(vec![(
            OCM_URL,
            Reply::Body(json!([ocm_poi(2, json!(51.5))])),
        )]);
        let mut options = PipelineOptions::default();
        options.providers.ocm_url = OCM_URL.to_string();
        options.providers.overpass_url = OVERPASS_URL.to_string();
        let pipeline = pipeline(transport.clone(), options);

        let wide = Viewport::new("-1.0,51.0,0.0,52.0".parse().unwrap());
        let outcome = pipeline.load(&wide, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.tiles, 1);
        assert_eq!(transport.calls_to(OCM_URL), 1);
    }

    /// Record-level filters drop non-matching providers down the chain
    #[tokio::test]
    async fn test_filters_apply_after_normalization() {
        let transport = ScriptedTransport::new(vec![(
            OCM_URL,
            Reply::Body(json!([ocm_poi(2, json!(51.5))])),
        )]);
        let pipeline = pipeline(transport, options());
        let token = CancellationToken::new();

        let ccs = london().with_filters(FilterSet::default().with_connector("ccs"));
        let outcome = pipeline.load(&ccs, &token).await.unwrap();
        assert_eq!(outcome.source, "ocm");

        let chademo = london().with_filters(FilterSet::default().with_connector("chademo"));
        let outcome = pipeline.load(&chademo, &token).await.unwrap();
        assert_eq!(outcome.source, "synthetic");
        assert!(outcome
            .records
            .iter()
            .all(|record| chademo.filters.matches(record)));
    }

    #[test]
    fn test_bounding_box_normalization_is_idempotent() {
        let swapped: BoundingBox = "10,20,-10,-20".parse().unwrap();
        let straight = BoundingBox::new(-10.0, -20.0, 10.0, 20.0).unwrap();
        assert_eq!(swapped, straight);
        assert_eq!(swapped.normalized().unwrap(), swapped);

        let named: BoundingBox = "north=20; south=-20; east=10; west=-10".parse().unwrap();
        assert_eq!(named, straight);

        assert!(matches!(
            "0,0,0,91".parse::<BoundingBox>(),
            Err(MapError::InvalidBoundingBox(_))
        ));
    }

    #[test]
    fn test_tiling_covers_parent() {
        let boxes = [
            BoundingBox::new(-0.5, 51.2, 0.3, 51.7).unwrap(),
            BoundingBox::new(-180.0, -90.0, 180.0, 90.0).unwrap(),
            BoundingBox::new(2.0, 48.0, 2.0001, 48.0001).unwrap(),
        ];
        for bbox in boxes {
            for n in 1..=4u32 {
                let tiles = chargemap::tiles::partition(&bbox, n, 3);
                assert_eq!(tiles.len(), (n * n) as usize);

                let area: f64 = tiles.iter().map(|tile| tile.bounds.area()).sum();
                assert!((area - bbox.area()).abs() < 1e-9 * bbox.area().max(1.0));
                assert!(tiles
                    .iter()
                    .all(|tile| tile.bounds.west >= bbox.west && tile.bounds.east <= bbox.east));
            }
        }
    }

    #[test]
    fn test_dedup_merge_correctness() {
        let mut a = StationRecord::new("1", 0.0, 0.0, "ocm");
        a.connector_count = 2;
        let mut b = StationRecord::new("1", 0.0, 0.0, "ocm");
        b.connector_count = 3;

        let merged = merge_records(vec![vec![a], vec![b]], 4);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "1");
        assert_eq!(merged[0].lat, 0.0);
        assert_eq!(merged[0].lng, 0.0);
        assert_eq!(merged[0].connector_count, 5);
    }
}
