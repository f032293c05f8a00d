//! Viewport Sampler Library - Bounded Viewport Queries over Clustered Stations
//!
//! This library answers geographic viewport queries over a large set of point stations,
//! returning a bounded-size, evenly spread sample instead of every station in the box.
//! Each station carries precomputed cluster ranks; a station is visible at level `L` when
//! one of its ranks is `<= L`, so picking a level thins the result set out evenly.
//!
//! # Architecture
//!
//! - **[`BoxPolygonBuilder`]**: Turns a latitude/longitude box into a densified polygon ring
//!   that spherical indexes (geodesic edges) interpret as the intended constant-latitude box
//! - **[`ClusterLevelResolver`]**: Picks the cluster level whose count approximates a limit
//!   through a small, fixed number of [`CountOracle`] calls
//! - **[`MemoryStationStore`]**: In-process dataset implementing the oracle traits
//! - **[`ViewportSampler`]**: The full pipeline (validate, build, resolve, fetch)
//! - **[`synthetic`]**: Deterministic grid datasets with hierarchical ranks
//!
//! # Performance Characteristics
//!
//! - **Polygon build**: O(P) where P is the number of extra points per edge
//! - **Level resolution**: 3 oracle round trips (regression), or `3 + max_iterations`
//!   (root finding), independent of dataset size

mod cluster;
mod geometry;
mod oracle;
mod sampler;
mod station;
pub mod synthetic;

// Public API exports
pub use cluster::{
    ClusterLevelResolver, DEFAULT_ROOT_FINDING_ITERATIONS, LevelResolution, ResolverStrategy,
};
pub use geometry::{
    BoundingBox, BoxPolygon, BoxPolygonBuilder, DEFAULT_PRECISION_DEGREES, MAX_SUBDIVISION_STEPS,
    STRICT_WINDING_CRS, additional_points_needed,
};
pub use oracle::{
    BlockingCountOracle, BoundsOracle, CachedBounds, CountOracle, DEFAULT_BOUNDS_TTL,
    DensityBounds, StationFetcher, SyncCountOracle,
};
pub use sampler::{Config, ViewportRequest, ViewportSample, ViewportSampler};
pub use station::{MemoryStationStore, Station, StationField, StationFilter, StationStatus};

use std::time::Duration;

/// Error types for the sampling pipeline
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Invalid coordinate: lon={lon}, lat={lat}")]
    InvalidCoordinate { lon: f64, lat: f64 },

    #[error("Degenerate bounding box: both corners are equal")]
    DegenerateBox,

    #[error("Invalid density bounds: min={min} > max={max}")]
    InvalidBounds { min: i64, max: i64 },

    #[error("Invalid precision: {0} (expected a finite number of degrees > 0)")]
    InvalidPrecision(f64),

    #[error("Unknown station field: {0}")]
    UnknownField(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(u64),

    #[error("Dataset has no cluster ranks")]
    EmptyDataset,

    #[error("Oracle failure: {0}")]
    Oracle(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Oracle call timed out after {0:?}")]
    OracleTimeout(Duration),

    #[error(
        "Count oracle is not monotonic: count(level<={lower_level})={lower_count} > count(level<={upper_level})={upper_count}"
    )]
    NonMonotonicCounts {
        lower_level: i64,
        lower_count: u64,
        upper_level: i64,
        upper_count: u64,
    },

    #[error("Blocking oracle task failed: {0}")]
    BlockingTask(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, DataError>;
