//! Pipeline-wide defaults.
//! Keeping them in a single place makes it easier to tweak the tunable knobs;
//! every one of them can be overridden through `PipelineOptions`.

/// Decimal places cache keys are quantized to (3 places is roughly 100 m).
pub const DEFAULT_KEY_PRECISION: u32 = 3;

/// Decimal places of the position-based dedup key for records without an id.
pub const DEFAULT_DEDUP_PRECISION: u32 = 4;

/// Grid size for tiled fetches (`n x n` tiles). 1 fetches every box whole;
/// tiling is opted into through the wide-area profile or an explicit grid.
pub const DEFAULT_TILE_GRID: u32 = 1;

/// Largest accepted grid: one viewport never fans out to more than
/// `MAX_TILE_GRID^2` concurrent chain fetches.
pub const MAX_TILE_GRID: u32 = 8;

/// Boxes spanning fewer degrees than this in both axes are fetched whole.
pub const DEFAULT_TILE_MIN_SPAN_DEG: f64 = 0.5;

/// Maximum number of cached query results.
pub const DEFAULT_CACHE_ENTRIES: usize = 256;

/// Cached results older than this read as misses.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Trailing-edge debounce window for viewport events.
pub const DEFAULT_DEBOUNCE_MS: u64 = 400;

/// Per-provider request timeout.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 9_000;

/// Radius used when a geocoder hit is turned into a viewport.
pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 5.0;

/// The primary provider's single widen-and-retry multiplies the radius by this.
pub const DEFAULT_WIDEN_FACTOR: f64 = 2.0;

/// Upper bound for the widened search radius.
pub const DEFAULT_MAX_RADIUS_KM: f64 = 50.0;

/// Result cap requested from remote providers.
pub const DEFAULT_MAX_RESULTS: u32 = 500;

/// Number of records the synthetic fallback lays out in a box.
pub const DEFAULT_SYNTHETIC_COUNT: u32 = 12;

/// Open Charge Map POI endpoint.
pub const OCM_API_URL: &str = "https://api.openchargemap.io/v3/poi/";

/// Public Overpass interpreter endpoint.
pub const OVERPASS_API_URL: &str = "https://overpass-api.de/api/interpreter";

/// User agent sent to every upstream provider.
pub const USER_AGENT: &str = concat!("chargemap/", env!("CARGO_PKG_VERSION"));
