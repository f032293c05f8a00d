//! Box polygon construction for spherical "geometry within" queries
//!
//! Spherical indexes interpret polygon edges as geodesics (great circles). A plain
//! 4-corner rectangle therefore bulges towards the poles along its east-west edges,
//! increasingly so at high latitudes or wide longitude spans. This module densifies
//! those edges so that every geodesic between consecutive ring points stays within
//! a configurable number of degrees of the nominal constant latitude.

use crate::{DataError, Result};
use geo::{Coord, Intersects, LineString, Polygon};
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default maximum deviation, in degrees of latitude, between an edge and its geodesics
pub const DEFAULT_PRECISION_DEGREES: f64 = 1.0;

/// Upper bound on the subdivision search, so malformed input always terminates
pub const MAX_SUBDIVISION_STEPS: u32 = 16;

/// Coordinate reference system requesting strict winding ("big polygon") semantics
pub const STRICT_WINDING_CRS: &str = "urn:x-mongodb:crs:strictwinding:EPSG:4326";

const MIN_LON: f64 = -180.0;
const MAX_LON: f64 = 180.0;
const MIN_LAT: f64 = -90.0;
const MAX_LAT: f64 = 90.0;

/// Axis-aligned latitude/longitude box given by its south-west and north-east corners
///
/// Coordinates are `geo::Coord` with `x` = longitude and `y` = latitude, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    sw: Coord<f64>,
    ne: Coord<f64>,
}

impl BoundingBox {
    /// Create a box keeping the corner orientation as given
    ///
    /// A viewport crossing the antimeridian has `sw.x > ne.x` and spans eastwards from
    /// `sw.x` through 180 to `ne.x`, so the corners are not reordered here. Use
    /// [`BoundingBox::from_corners`] for two arbitrary corners.
    pub fn new(sw: Coord<f64>, ne: Coord<f64>) -> Result<Self> {
        validate_coord(sw)?;
        validate_coord(ne)?;
        if sw == ne {
            return Err(DataError::DegenerateBox);
        }
        Ok(Self { sw, ne })
    }

    /// Create a box from two arbitrary opposite corners, ordering them by min/max
    pub fn from_corners(a: Coord<f64>, b: Coord<f64>) -> Result<Self> {
        validate_coord(a)?;
        validate_coord(b)?;
        let sw = Coord {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
        };
        let ne = Coord {
            x: a.x.max(b.x),
            y: a.y.max(b.y),
        };
        Self::new(sw, ne)
    }

    /// South-west corner
    #[inline]
    pub fn sw(&self) -> Coord<f64> {
        self.sw
    }

    /// North-east corner
    #[inline]
    pub fn ne(&self) -> Coord<f64> {
        self.ne
    }

    #[inline]
    pub fn crosses_antimeridian(&self) -> bool {
        self.sw.x > self.ne.x
    }

    /// Eastward longitude extent from `sw` to `ne`, in `[0, 360]`
    pub fn span_degrees(&self) -> f64 {
        let span = self.ne.x - self.sw.x;
        if span < 0.0 { span + 360.0 } else { span }
    }
}

fn validate_coord(coord: Coord<f64>) -> Result<()> {
    if (MIN_LON..=MAX_LON).contains(&coord.x) && (MIN_LAT..=MAX_LAT).contains(&coord.y) {
        Ok(())
    } else {
        Err(DataError::InvalidCoordinate {
            lon: coord.x,
            lat: coord.y,
        })
    }
}

/// A closed polygon ring approximating a [`BoundingBox`] under geodesic edges
///
/// The ring always starts and ends on the south-west corner and runs
/// counter-clockwise for a box with `sw` below `ne`. Longitudes run continuously
/// eastwards from `sw`, so a box crossing the antimeridian has ring longitudes above
/// 180; [`BoxPolygon::to_geojson`] wraps them back into `[-180, 180]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxPolygon {
    polygon: Polygon<f64>,
}

impl BoxPolygon {
    /// The closed exterior ring
    #[inline]
    pub fn exterior(&self) -> &LineString<f64> {
        self.polygon.exterior()
    }

    /// The underlying polygon
    #[inline]
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Coordinate reference system name attached to the ring
    #[inline]
    pub fn crs(&self) -> &'static str {
        STRICT_WINDING_CRS
    }

    /// Planar point-in-ring test, boundary inclusive
    ///
    /// `position` is also tested one turn east, which covers rings extending past 180.
    #[inline]
    pub fn contains_position(&self, position: &Coord<f64>) -> bool {
        self.polygon.intersects(position)
            || self.polygon.intersects(&Coord {
                x: position.x + 360.0,
                y: position.y,
            })
    }

    /// GeoJSON `Polygon` with the strict winding CRS, ready for a `$geoWithin` query
    #[cfg(feature = "serde")]
    pub fn to_geojson(&self) -> serde_json::Value {
        let ring: Vec<[f64; 2]> = self
            .exterior()
            .coords()
            .map(|c| [if c.x > MAX_LON { c.x - 360.0 } else { c.x }, c.y])
            .collect();
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [ring],
            "crs": {
                "type": "name",
                "properties": { "name": STRICT_WINDING_CRS }
            }
        })
    }
}

/// Number of extra, evenly spaced points needed along an east-west edge
///
/// The edge runs at latitude `lat` from `lon1` to `lon2`. With the edge split into `n`
/// equal parts, the geodesic of one part peaks at `atan(tan(lat) / cos(span / 2n))`.
/// The smallest `n` keeping that peak within `precision_degrees` of `lat` is searched
/// for, and `2^(n-1) - 1` extra points are returned.
///
/// The search stops at [`MAX_SUBDIVISION_STEPS`] (NaN or out-of-range latitudes,
/// non-positive precision) and returns the point count of that last step.
pub fn additional_points_needed(lat: f64, lon1: f64, lon2: f64, precision_degrees: f64) -> usize {
    let x = lat * PI / 180.0;
    let y = (lon1 - lon2) * PI / 360.0;

    for n in 1..=MAX_SUBDIVISION_STEPS {
        let lat_max = (x.tan() / (y / f64::from(n)).cos()).atan() * 180.0 / PI;
        let delta = (lat_max - lat).abs();
        if delta <= precision_degrees {
            return extra_points_for(n);
        }
    }

    tracing::warn!(
        lat,
        lon1,
        lon2,
        precision_degrees,
        "edge subdivision did not converge, using the step ceiling"
    );
    extra_points_for(MAX_SUBDIVISION_STEPS)
}

#[inline]
fn extra_points_for(steps: u32) -> usize {
    (1usize << (steps - 1)) - 1
}

/// Builds [`BoxPolygon`] rings from bounding boxes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxPolygonBuilder {
    precision_degrees: f64,
}

impl Default for BoxPolygonBuilder {
    fn default() -> Self {
        Self {
            precision_degrees: DEFAULT_PRECISION_DEGREES,
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl BoxPolygonBuilder {
    /// Create a builder with the given maximum latitude deviation in degrees
    ///
    /// The precision must be finite and positive; anything else would always run the
    /// subdivision search into its ceiling.
    pub fn new(precision_degrees: f64) -> Result<Self> {
        if !(precision_degrees.is_finite() && precision_degrees > 0.0) {
            return Err(DataError::InvalidPrecision(precision_degrees));
        }
        Ok(Self { precision_degrees })
    }

    /// Maximum latitude deviation in degrees
    #[inline]
    pub fn precision_degrees(&self) -> f64 {
        self.precision_degrees
    }

    /// Build the densified ring for a box
    ///
    /// Bottom edge west to east, then top edge east to west, then back to the start.
    pub fn build(&self, bbox: &BoundingBox) -> BoxPolygon {
        let sw = bbox.sw();
        let ne = bbox.ne();
        let span = bbox.span_degrees();
        let east = sw.x + span;

        let points_bottom = additional_points_needed(sw.y, sw.x, east, self.precision_degrees);
        let points_top = additional_points_needed(ne.y, sw.x, east, self.precision_degrees);

        let mut coords = Vec::with_capacity(points_bottom + points_top + 5);

        let bottom_parts = (points_bottom + 1) as f64;
        coords.extend((0..points_bottom + 2).map(|i| Coord {
            x: sw.x + (i as f64 / bottom_parts) * span,
            y: sw.y,
        }));

        let top_parts = (points_top + 1) as f64;
        coords.extend((0..points_top + 2).map(|j| Coord {
            x: east - (j as f64 / top_parts) * span,
            y: ne.y,
        }));

        coords.push(sw);

        tracing::trace!(
            points_bottom,
            points_top,
            ring_len = coords.len(),
            "built box polygon"
        );

        BoxPolygon {
            polygon: Polygon::new(LineString::new(coords), vec![]),
        }
    }
}
