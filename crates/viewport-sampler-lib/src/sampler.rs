//! ViewportSampler - the viewport query pipeline
//!
//! This module ties the pieces together the way a request handler uses them: reject
//! degenerate boxes, build the densified polygon, resolve a cluster level against the
//! count oracle, then fetch with that level, or without a level filter when none fits.

use crate::{
    BoundingBox, BoundsOracle, BoxPolygon, BoxPolygonBuilder, ClusterLevelResolver,
    CountOracle, DEFAULT_BOUNDS_TTL, DEFAULT_PRECISION_DEGREES, LevelResolution,
    ResolverStrategy, Result, Station, StationFetcher, StationField, StationFilter,
};
use geo::Coord;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the sampling pipeline
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Maximum latitude deviation of the box polygon edges, in degrees.
    /// Default: 1.0
    pub precision_degrees: f64,
    /// Level resolution algorithm.
    /// Default: regression
    pub strategy: ResolverStrategy,
    /// Limit used when the request has none.
    /// Default: 20
    pub default_limit: u32,
    /// Largest accepted limit; out-of-range requests are served with this one.
    /// Default: 500
    pub max_limit: u32,
    /// Time-to-live of cached density bounds (used by callers wrapping their bounds
    /// oracle in [`crate::CachedBounds`]).
    /// Default: 10 minutes
    pub bounds_ttl: Duration,
    /// Per oracle call timeout, none by default
    pub oracle_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            precision_degrees: DEFAULT_PRECISION_DEGREES,
            strategy: ResolverStrategy::Regression,
            default_limit: 20,
            max_limit: 500,
            bounds_ttl: DEFAULT_BOUNDS_TTL,
            oracle_timeout: None,
        }
    }
}

impl Config {
    /// Limit actually used for a request
    ///
    /// Absent → `default_limit`; within `1..=max_limit` → as requested; anything else
    /// → `max_limit`.
    pub fn effective_limit(&self, requested: Option<u32>) -> u64 {
        match requested {
            None => u64::from(self.default_limit),
            Some(limit) if (1..=self.max_limit).contains(&limit) => u64::from(limit),
            Some(_) => u64::from(self.max_limit),
        }
    }
}

/// A viewport query
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ViewportRequest {
    /// South-west corner, `x` = longitude, `y` = latitude
    pub sw: Coord<f64>,
    /// North-east corner
    pub ne: Coord<f64>,
    /// Requested number of stations
    pub limit: Option<u32>,
    /// Filters besides geometry and level
    pub filter: StationFilter,
    /// Fields to return besides the id, all of them when `None`
    #[cfg_attr(feature = "serde", serde(default))]
    pub fields: Option<Vec<StationField>>,
}

/// Result of a viewport query
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSample {
    /// Polygon the stations were queried with, `None` for an empty box
    pub geometry: Option<BoxPolygon>,
    /// Level used for the final fetch
    pub resolution: LevelResolution,
    /// Stations, in no particular order
    pub stations: Vec<Station>,
}

impl ViewportSample {
    fn empty() -> Self {
        Self {
            geometry: None,
            resolution: LevelResolution::NotFound,
            stations: Vec::new(),
        }
    }
}

/// Runs viewport queries against a station store
#[derive(Debug, Clone)]
pub struct ViewportSampler {
    config: Config,
    builder: BoxPolygonBuilder,
    resolver: ClusterLevelResolver,
}

impl ViewportSampler {
    /// Fails on a precision that is not a finite positive number of degrees
    pub fn new(config: Config) -> Result<Self> {
        let builder = BoxPolygonBuilder::new(config.precision_degrees)?;
        let mut resolver = ClusterLevelResolver::new(config.strategy);
        if let Some(timeout) = config.oracle_timeout {
            resolver = resolver.with_oracle_timeout(timeout);
        }
        Ok(Self {
            config,
            builder,
            resolver,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn resolver(&self) -> &ClusterLevelResolver {
        &self.resolver
    }

    /// Answer a viewport query with a bounded, evenly spread sample
    ///
    /// A box whose corners coincide yields an empty sample without touching the store.
    /// `bounds` is only read when the strategy needs the rank range.
    pub async fn sample<S, B>(
        &self,
        store: &S,
        bounds: &B,
        request: &ViewportRequest,
    ) -> Result<ViewportSample>
    where
        S: CountOracle + StationFetcher + ?Sized,
        B: BoundsOracle + ?Sized,
    {
        if request.sw == request.ne {
            tracing::debug!(sw = ?request.sw, "empty viewport");
            return Ok(ViewportSample::empty());
        }

        let bbox = BoundingBox::new(request.sw, request.ne)?;
        let geometry = self.builder.build(&bbox);
        let limit = self.config.effective_limit(request.limit);

        let resolution = self
            .resolver
            .resolve_from(&geometry, &request.filter, limit, store, bounds)
            .await?;

        let stations = store
            .fetch(
                &geometry,
                resolution.level(),
                &request.filter,
                request.fields.as_deref(),
            )
            .await?;

        match resolution {
            LevelResolution::Found(level) => {
                tracing::debug!(limit, level, stations = stations.len(), "viewport sampled");
            }
            LevelResolution::NotFound => {
                tracing::debug!(limit, stations = stations.len(), "viewport unfiltered");
            }
        }

        Ok(ViewportSample {
            geometry: Some(geometry),
            resolution,
            stations,
        })
    }
}
