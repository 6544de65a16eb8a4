use anyhow::{bail, Context, Result};
use chargemap::prelude::*;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Charging station lookups over a fault-tolerant provider chain")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// options preset
    #[arg(long, value_enum, default_value = "balanced", global = true)]
    profile: Profile,

    /// JSON file with pipeline options (overrides --profile)
    #[arg(long, value_name = "file", global = true)]
    config: Option<PathBuf>,

    /// static snapshot consulted when the remote providers fail
    #[arg(long, value_name = "file", global = true)]
    snapshot: Option<PathBuf>,

    /// tile grid size for wide boxes (1 disables tiling, at most 8)
    #[arg(long, value_name = "int", global = true)]
    grid: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// stations inside a bounding box
    Query(Query),
    /// stations around a point
    Near(Near),
    /// feed newline separated boxes through the debouncing coordinator
    Replay(Replay),
}

#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    Balanced,
    LowBandwidth,
    WideArea,
}

#[derive(Args)]
struct Filters {
    /// connector type keyword, e.g. "ccs" or "type 2"
    #[arg(long)]
    connector: Option<String>,

    /// minimum connector power in kW
    #[arg(long, value_name = "kw")]
    min_power: Option<f64>,

    /// "auto" or a single provider name (ocm, osm, snapshot, synthetic)
    #[arg(long, default_value = "auto")]
    source: String,
}

impl Filters {
    fn to_filter_set(&self) -> FilterSet {
        let source = match self.source.trim() {
            "" | "auto" => SourceSelector::Auto,
            name => SourceSelector::Only(name.to_string()),
        };
        let mut filters = FilterSet::default().with_source(source);
        if let Some(connector) = &self.connector {
            filters = filters.with_connector(connector.as_str());
        }
        if let Some(kw) = self.min_power {
            filters = filters.with_min_power(kw);
        }
        filters
    }
}

#[derive(Args)]
struct Query {
    /// west,south,east,north (or west=..,south=..,east=..,north=..)
    #[arg(long, allow_hyphen_values = true)]
    bbox: String,

    #[command(flatten)]
    filters: Filters,
}

#[derive(Args)]
struct Near {
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    lng: f64,

    #[arg(long, value_name = "km", default_value_t = chargemap::constants::DEFAULT_SEARCH_RADIUS_KM)]
    radius_km: f64,

    #[command(flatten)]
    filters: Filters,
}

#[derive(Args)]
struct Replay {
    /// one bounding box per line; blank lines and lines starting with '#' are skipped
    file: PathBuf,

    /// pause between two lines
    #[arg(long, value_name = "ms", default_value_t = 100)]
    interval_ms: u64,

    #[command(flatten)]
    filters: Filters,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let builder = builder(&cli)?;

    match &cli.command {
        Commands::Query(args) => {
            let bounds: BoundingBox = args.bbox.parse()?;
            let viewport = Viewport::new(bounds).with_filters(args.filters.to_filter_set());
            load_and_print(builder, viewport).await
        }
        Commands::Near(args) => {
            let center = LatLng::new(args.lat, args.lng);
            if !center.is_valid() {
                bail!("({}, {}) is not a valid coordinate", args.lat, args.lng);
            }
            let viewport = Viewport::around(center, args.radius_km)?
                .with_filters(args.filters.to_filter_set());
            load_and_print(builder, viewport).await
        }
        Commands::Replay(args) => replay(builder, args).await,
    }
}

fn builder(cli: &Cli) -> Result<PipelineBuilder> {
    let mut builder = match &cli.config {
        Some(path) => PipelineBuilder::new().with_options(
            PipelineOptions::from_json_file(path)
                .with_context(|| format!("reading options from {}", path.display()))?,
        ),
        None => PipelineBuilder::new().with_profile(match cli.profile {
            Profile::Balanced => PipelineProfile::Balanced,
            Profile::LowBandwidth => PipelineProfile::LowBandwidth,
            Profile::WideArea => PipelineProfile::WideArea,
        }),
    }
    .with_env();

    if let Some(path) = &cli.snapshot {
        builder = builder.with_snapshot(path.clone());
    }
    if let Some(n) = cli.grid {
        builder = builder.with_tile_grid(n);
    }
    Ok(builder)
}

async fn load_and_print(builder: PipelineBuilder, viewport: Viewport) -> Result<()> {
    let pipeline = builder.build()?;
    let outcome = pipeline.load(&viewport, &CancellationToken::new()).await?;

    let output = json!({
        "source": outcome.source,
        "cacheHit": outcome.cache_hit,
        "tiles": outcome.tiles,
        "count": outcome.records.len(),
        "records": outcome.records,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn replay(builder: PipelineBuilder, args: &Replay) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let (coordinator, events) = builder.build_coordinator()?;
    let filters = args.filters.to_filter_set();

    let mut issued = 0usize;
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<BoundingBox>() {
            Ok(bounds) => {
                coordinator.on_viewport_change(bounds, filters.clone())?;
                issued += 1;
            }
            Err(err) => log::warn!("line {}: {err}", number + 1),
        }
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }
    if issued == 0 {
        bail!("no usable bounding boxes in {}", args.file.display());
    }

    // long enough for the trailing debounce plus one full walk of the chain
    let options = coordinator.pipeline().options();
    let providers = coordinator.pipeline().provider_names().len() as u32;
    let deadline = tokio::time::Instant::now()
        + options.fetch.debounce()
        + options.fetch.timeout() * providers
        + Duration::from_secs(1);
    tokio::time::sleep(options.fetch.debounce()).await;

    loop {
        for event in events.try_iter() {
            match event {
                PipelineEvent::RecordsUpdated { records, meta } => {
                    let line = json!({
                        "requestId": meta.request_id,
                        "source": meta.source,
                        "cacheHit": meta.cache_hit,
                        "count": records.len(),
                        "records": records,
                    });
                    println!("{line}");
                    if meta.request_id == coordinator.last_request_id() {
                        coordinator.shutdown();
                        return Ok(());
                    }
                }
                PipelineEvent::Error(message) => log::error!("{message}"),
            }
        }
        if tokio::time::Instant::now() >= deadline {
            coordinator.shutdown();
            bail!("timed out waiting for the last viewport");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
