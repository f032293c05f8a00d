use clap::{Parser, ValueEnum};
use geo::Coord;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use viewport_sampler_lib::{
    BoxPolygonBuilder, Config, DEFAULT_PRECISION_DEGREES, DEFAULT_ROOT_FINDING_ITERATIONS,
    ResolverStrategy, StationField, StationFilter, ViewportRequest,
};

/// Environment variable naming the dataset file when `--dataset` is absent
pub const DATASET_ENV: &str = "VIEWPORT_SAMPLER_DATASET";

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Viewport Sampler - Query an evenly spread, bounded sample of stations inside a map viewport
pub struct Settings {
    /// South-west corner of the viewport
    #[clap(long, value_name = "LON,LAT", value_parser = parse_corner, allow_hyphen_values = true)]
    pub sw: Coord<f64>,

    /// North-east corner of the viewport
    #[clap(long, value_name = "LON,LAT", value_parser = parse_corner, allow_hyphen_values = true)]
    pub ne: Coord<f64>,

    /// Requested number of stations (default 20, capped at 500)
    #[clap(short, long)]
    pub limit: Option<u32>,

    /// Maximum latitude deviation of the viewport polygon edges, in degrees
    #[clap(short, long, default_value_t = DEFAULT_PRECISION_DEGREES, value_parser = parse_precision)]
    pub precision: f64,

    /// Cluster level resolution algorithm
    #[clap(long, value_enum, default_value_t = Strategy::Regression)]
    pub strategy: Strategy,

    /// Iteration cap of the root-finding strategy
    #[clap(long, default_value_t = DEFAULT_ROOT_FINDING_ITERATIONS)]
    pub iterations: u32,

    /// Timeout of every store call, in milliseconds
    #[clap(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Only return stations of this provider
    #[clap(long)]
    pub provider: Option<String>,

    /// Station fields to return besides the id, comma separated (default: all)
    #[clap(short, long, value_name = "FIELD", value_delimiter = ',', value_parser = parse_field)]
    pub keys: Vec<StationField>,

    /// Also return hidden stations
    #[clap(long, default_value = "false")]
    pub include_hidden: bool,

    /// Only return stations measured within this many days (0 disables the filter)
    #[clap(long, default_value = "30")]
    pub max_age_days: u64,

    /// JSON array of stations to load (falls back to $VIEWPORT_SAMPLER_DATASET, then to a synthetic grid)
    #[clap(short, long, value_name = "FILE")]
    pub dataset: Option<PathBuf>,

    /// Synthetic grid depth: 2^depth stations per side, cluster ranks 0..=depth
    #[clap(long, default_value = "6")]
    pub synthetic_depth: u32,

    /// Log debug output (ignored when RUST_LOG is set)
    #[clap(short, long, default_value = "false")]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Regression,
    RootFinding,
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    pub fn config(&self) -> Config {
        let strategy = match self.strategy {
            Strategy::Regression => ResolverStrategy::Regression,
            Strategy::RootFinding => ResolverStrategy::RootFinding {
                max_iterations: self.iterations,
            },
        };
        Config {
            precision_degrees: self.precision,
            strategy,
            oracle_timeout: self.timeout_ms.map(Duration::from_millis),
            ..Default::default()
        }
    }

    pub fn request(&self) -> ViewportRequest {
        ViewportRequest {
            sw: self.sw,
            ne: self.ne,
            limit: self.limit,
            filter: StationFilter {
                provider: self.provider.clone(),
                include_hidden: self.include_hidden,
                measured_since: self.measured_since(unix_now()),
            },
            fields: (!self.keys.is_empty()).then(|| self.keys.clone()),
        }
    }

    /// Oldest accepted measurement timestamp, relative to `now`
    pub fn measured_since(&self, now: i64) -> Option<i64> {
        let max_age = i64::try_from(self.max_age_days).ok()?.checked_mul(SECONDS_PER_DAY)?;
        (max_age > 0).then(|| now.saturating_sub(max_age))
    }

    /// Dataset file from the command line or the environment
    pub fn dataset_path(&self) -> Option<PathBuf> {
        self.dataset.clone().or_else(|| get_env(DATASET_ENV))
    }
}

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Current unix timestamp in seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

/// Generic function to get environment variable, parsing it to the desired type.
pub fn get_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn parse_precision(s: &str) -> Result<f64, String> {
    let precision = s
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid precision {s:?}: {e}"))?;
    BoxPolygonBuilder::new(precision)
        .map(|builder| builder.precision_degrees())
        .map_err(|e| e.to_string())
}

fn parse_field(s: &str) -> Result<StationField, String> {
    s.parse().map_err(|e: viewport_sampler_lib::DataError| e.to_string())
}

fn parse_corner(s: &str) -> Result<Coord<f64>, String> {
    let (lon, lat) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LON,LAT, got {s:?}"))?;
    let lon = lon
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid longitude {lon:?}: {e}"))?;
    let lat = lat
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid latitude {lat:?}: {e}"))?;
    Ok(Coord { x: lon, y: lat })
}
