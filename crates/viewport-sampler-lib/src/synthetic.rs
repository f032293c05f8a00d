//! Synthetic station datasets for demos, tests and benchmarks
//!
//! Generates a square grid of stations with hierarchical cluster ranks: a station at
//! grid index `(i, j)` gets rank `depth - min(tz(i), tz(j), depth)` where `tz` counts
//! trailing zero bits. Level `L` therefore shows every `2^(depth-L)`-th station along
//! each axis, i.e. `4^L` stations over the full grid.

use crate::{Station, StationStatus};
use geo::Coord;
use smallvec::smallvec;

/// Grid dataset description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticGrid {
    /// South-west station position
    pub origin: Coord<f64>,
    /// Grid has `2^depth` stations per side and ranks `0..=depth`
    pub depth: u32,
    /// Distance between neighbouring stations in degrees
    pub spacing_degrees: f64,
    /// Timestamp stored as every station's last measurement
    pub last_measure: i64,
}

impl Default for SyntheticGrid {
    fn default() -> Self {
        Self {
            origin: Coord { x: 5.0, y: 45.0 },
            depth: 5,
            spacing_degrees: 0.1,
            last_measure: 0,
        }
    }
}

impl SyntheticGrid {
    /// Stations per side
    #[inline]
    pub fn side(&self) -> usize {
        1usize << self.depth
    }

    /// Rank of the station at grid index `(i, j)`
    pub fn rank(&self, i: usize, j: usize) -> i64 {
        let coarseness = i.trailing_zeros().min(j.trailing_zeros()).min(self.depth);
        i64::from(self.depth - coarseness)
    }

    pub fn generate(&self) -> Vec<Station> {
        let side = self.side();
        let mut stations = Vec::with_capacity(side * side);
        for i in 0..side {
            for j in 0..side {
                let id = format!("syn-{i}-{j}");
                stations.push(Station {
                    name: id.clone(),
                    id,
                    provider: "syn".to_string(),
                    position: Coord {
                        x: self.origin.x + j as f64 * self.spacing_degrees,
                        y: self.origin.y + i as f64 * self.spacing_degrees,
                    },
                    clusters: smallvec![self.rank(i, j)],
                    status: StationStatus::Green,
                    last_measure: Some(self.last_measure),
                });
            }
        }
        stations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_size() {
        let grid = SyntheticGrid {
            depth: 3,
            ..Default::default()
        };
        assert_eq!(grid.side(), 8);
        assert_eq!(grid.generate().len(), 64);
    }

    #[test]
    fn test_ranks_are_hierarchical() {
        let grid = SyntheticGrid::default();
        assert_eq!(grid.rank(0, 0), 0);
        assert_eq!(grid.rank(16, 0), 1);
        assert_eq!(grid.rank(16, 8), 2);
        assert_eq!(grid.rank(1, 0), 5);

        let stations = grid.generate();
        for level in 0..=5 {
            let visible = stations.iter().filter(|s| s.is_visible_at(level)).count();
            assert_eq!(visible, 4usize.pow(level as u32));
        }
    }

    #[test]
    fn test_positions() {
        let grid = SyntheticGrid::default();
        let stations = grid.generate();
        assert_eq!(stations[0].position, Coord { x: 5.0, y: 45.0 });
        let last = stations.last().unwrap();
        assert!((last.position.x - 8.1).abs() < 1e-9);
        assert!((last.position.y - 48.1).abs() < 1e-9);
    }
}
