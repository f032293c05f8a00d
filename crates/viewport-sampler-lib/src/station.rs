//! Station data model and the in-memory store
//!
//! Stations are point entities carrying a small set of precomputed cluster ranks. The
//! ranks are assigned offline; this crate only reads them.

use crate::{
    BoundsOracle, BoxPolygon, CountOracle, DataError, DensityBounds, Result, StationFetcher,
    SyncCountOracle,
};
use async_trait::async_trait;
use geo::Coord;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Operational status reported for a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StationStatus {
    /// Station ok
    #[default]
    Green,
    /// Data might be inaccurate
    Orange,
    /// Station isn't working
    Red,
    /// Never returned by queries unless explicitly requested
    Hidden,
}

/// A point station with its cluster ranks
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Station {
    /// Station ID, `{provider}-{provider id}`
    pub id: String,
    /// Provider code
    pub provider: String,
    /// Display name
    pub name: String,
    /// Position, `x` = longitude and `y` = latitude in degrees
    pub position: Coord<f64>,
    /// Cluster ranks; lower ranks stay visible at coarser views
    pub clusters: SmallVec<[i64; 4]>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: StationStatus,
    /// Unix timestamp of the last measurement
    #[cfg_attr(feature = "serde", serde(default))]
    pub last_measure: Option<i64>,
}

impl Station {
    /// Whether the station is visible at `level`, i.e. one of its ranks is `<= level`
    #[inline]
    pub fn is_visible_at(&self, level: i64) -> bool {
        self.clusters.iter().any(|&rank| rank <= level)
    }

    /// Copy keeping only `fields` and the id
    ///
    /// Fields left out are reset to their empty value.
    pub fn project(&self, fields: &[StationField]) -> Station {
        let has = |field| fields.contains(&field);
        Station {
            id: self.id.clone(),
            provider: if has(StationField::Provider) {
                self.provider.clone()
            } else {
                String::new()
            },
            name: if has(StationField::Name) {
                self.name.clone()
            } else {
                String::new()
            },
            position: if has(StationField::Position) {
                self.position
            } else {
                Coord::default()
            },
            clusters: if has(StationField::Clusters) {
                self.clusters.clone()
            } else {
                SmallVec::new()
            },
            status: if has(StationField::Status) {
                self.status
            } else {
                StationStatus::default()
            },
            last_measure: self.last_measure.filter(|_| has(StationField::LastMeasure)),
        }
    }
}

/// Selectable [`Station`] field, named as in the serialized form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StationField {
    Id,
    Provider,
    Name,
    Position,
    Clusters,
    Status,
    LastMeasure,
}

impl StationField {
    pub const ALL: [StationField; 7] = [
        StationField::Id,
        StationField::Provider,
        StationField::Name,
        StationField::Position,
        StationField::Clusters,
        StationField::Status,
        StationField::LastMeasure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StationField::Id => "id",
            StationField::Provider => "provider",
            StationField::Name => "name",
            StationField::Position => "position",
            StationField::Clusters => "clusters",
            StationField::Status => "status",
            StationField::LastMeasure => "last_measure",
        }
    }
}

impl fmt::Display for StationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StationField {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == name)
            .ok_or_else(|| DataError::UnknownField(name.to_string()))
    }
}

/// Filters applied to every count and fetch besides geometry and level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationFilter {
    /// Only stations of this provider
    pub provider: Option<String>,
    /// Also match hidden stations
    pub include_hidden: bool,
    /// Only stations with a measurement strictly after this unix timestamp
    pub measured_since: Option<i64>,
}

impl StationFilter {
    pub fn matches(&self, station: &Station) -> bool {
        if !self.include_hidden && station.status == StationStatus::Hidden {
            return false;
        }
        if let Some(provider) = &self.provider {
            if station.provider != *provider {
                return false;
            }
        }
        match self.measured_since {
            Some(since) => station.last_measure.is_some_and(|last| last > since),
            None => true,
        }
    }
}

/// In-process station dataset
///
/// Scans are parallel. Containment is tested on the ring in the plane, boundary
/// inclusive, which matches the spherical interpretation up to the builder precision.
#[derive(Debug, Clone, Default)]
pub struct MemoryStationStore {
    stations: Arc<Vec<Station>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MemoryStationStore {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations: Arc::new(stations),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Global cluster rank range over every station
    pub fn density_bounds(&self) -> Result<DensityBounds> {
        let (min, max) = self
            .stations
            .par_iter()
            .flat_map_iter(|station| station.clusters.iter().copied())
            .fold(
                || (i64::MAX, i64::MIN),
                |(min, max), rank| (min.min(rank), max.max(rank)),
            )
            .reduce(
                || (i64::MAX, i64::MIN),
                |(a_min, a_max), (b_min, b_max)| (a_min.min(b_min), a_max.max(b_max)),
            );

        if min > max {
            return Err(DataError::EmptyDataset);
        }
        DensityBounds::new(min, max)
    }

    /// Number of stations matching geometry, level and filter
    pub fn count_matching(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
    ) -> u64 {
        self.stations
            .par_iter()
            .filter(|station| Self::is_match(station, geometry, max_level, filter))
            .count() as u64
    }

    /// Stations matching geometry, level and filter, projected onto `fields` if given
    pub fn find_matching(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
        fields: Option<&[StationField]>,
    ) -> Vec<Station> {
        self.stations
            .par_iter()
            .filter(|station| Self::is_match(station, geometry, max_level, filter))
            .map(|station| match fields {
                Some(fields) => station.project(fields),
                None => station.clone(),
            })
            .collect()
    }

    #[inline]
    fn is_match(
        station: &Station,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
    ) -> bool {
        max_level.is_none_or(|level| station.is_visible_at(level))
            && filter.matches(station)
            && geometry.contains_position(&station.position)
    }
}

#[async_trait]
impl CountOracle for MemoryStationStore {
    async fn count(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
    ) -> Result<u64> {
        Ok(self.count_matching(geometry, max_level, filter))
    }
}

impl SyncCountOracle for MemoryStationStore {
    fn count_blocking(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
    ) -> Result<u64> {
        Ok(self.count_matching(geometry, max_level, filter))
    }
}

#[async_trait]
impl BoundsOracle for MemoryStationStore {
    async fn bounds(&self) -> Result<DensityBounds> {
        self.density_bounds()
    }
}

#[async_trait]
impl StationFetcher for MemoryStationStore {
    async fn fetch(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
        fields: Option<&[StationField]>,
    ) -> Result<Vec<Station>> {
        Ok(self.find_matching(geometry, max_level, filter, fields))
    }
}
