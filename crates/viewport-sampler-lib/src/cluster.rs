//! Cluster level resolution
//!
//! Given a viewport geometry and a result cap, pick the cluster level whose station count
//! approximates the cap, using a small fixed number of count oracle calls instead of
//! counting or transferring the whole in-box set.
//!
//! Two strategies sit behind [`ClusterLevelResolver`]:
//!
//! - [`ResolverStrategy::Regression`] samples three levels spread over the global rank
//!   range, fits a least-squares line and solves it for the cap. Always 3 round trips,
//!   issued concurrently. Predictable latency, approximate result.
//! - [`ResolverStrategy::RootFinding`] runs Brent's bracketing method on
//!   `count(level) - limit` over `[1, count without level filter]`, capped at a few
//!   iterations. Fewer calls in theory, but with a tiny cap it often lands far from the
//!   target on irregular distributions.

use crate::{
    BoundsOracle, BoxPolygon, CountOracle, DataError, DensityBounds, Result, StationFilter,
};
use futures::future::try_join_all;
use std::future::Future;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default iteration cap for [`ResolverStrategy::RootFinding`]
pub const DEFAULT_ROOT_FINDING_ITERATIONS: u32 = 2;

/// Fractions of the rank range sampled by the regression strategy
const REGRESSION_SAMPLES: [f64; 3] = [0.0, 0.5, 1.0];

// Brent's method tolerances (absolute and relative)
const XTOL: f64 = 2e-12;
const RTOL: f64 = 4.0 * f64::EPSILON;

/// Outcome of a level resolution
///
/// `NotFound` is a normal result, not a failure: the caller runs the query without a
/// level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LevelResolution {
    Found(i64),
    NotFound,
}

impl LevelResolution {
    /// The level to filter on, if any
    #[inline]
    pub fn level(&self) -> Option<i64> {
        match self {
            Self::Found(level) => Some(*level),
            Self::NotFound => None,
        }
    }
}

/// Algorithm used by [`ClusterLevelResolver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum ResolverStrategy {
    /// Least-squares fit over three level samples
    #[default]
    Regression,
    /// Brent's bracketing root search with an iteration cap
    RootFinding { max_iterations: u32 },
}

impl ResolverStrategy {
    /// Root finding with [`DEFAULT_ROOT_FINDING_ITERATIONS`]
    pub fn root_finding() -> Self {
        Self::RootFinding {
            max_iterations: DEFAULT_ROOT_FINDING_ITERATIONS,
        }
    }
}

/// Stateless resolver over an externally owned count oracle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterLevelResolver {
    strategy: ResolverStrategy,
    oracle_timeout: Option<Duration>,
}

impl ClusterLevelResolver {
    pub fn new(strategy: ResolverStrategy) -> Self {
        Self {
            strategy,
            oracle_timeout: None,
        }
    }

    /// Bound every oracle call; expiry surfaces as [`DataError::OracleTimeout`]
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = Some(timeout);
        self
    }

    #[inline]
    pub fn strategy(&self) -> ResolverStrategy {
        self.strategy
    }

    #[inline]
    pub fn oracle_timeout(&self) -> Option<Duration> {
        self.oracle_timeout
    }

    /// Resolve the cluster level whose count approximates `limit`
    ///
    /// Oracle errors are returned unchanged and never retried.
    pub async fn resolve<O: CountOracle + ?Sized>(
        &self,
        geometry: &BoxPolygon,
        filter: &StationFilter,
        limit: u64,
        oracle: &O,
        bounds: DensityBounds,
    ) -> Result<LevelResolution> {
        self.resolve_from(geometry, filter, limit, oracle, &bounds)
            .await
    }

    /// Like [`ClusterLevelResolver::resolve`], reading the rank range from `bounds_oracle`
    ///
    /// The range is only read by the regression strategy. Root finding searches
    /// `[1, count without level filter]` and never calls `bounds_oracle`.
    pub async fn resolve_from<O, B>(
        &self,
        geometry: &BoxPolygon,
        filter: &StationFilter,
        limit: u64,
        oracle: &O,
        bounds_oracle: &B,
    ) -> Result<LevelResolution>
    where
        O: CountOracle + ?Sized,
        B: BoundsOracle + ?Sized,
    {
        if limit == 0 {
            return Err(DataError::InvalidLimit(limit));
        }

        let resolution = match self.strategy {
            ResolverStrategy::Regression => {
                let bounds = self.timed(bounds_oracle.bounds()).await?;
                self.resolve_by_regression(geometry, filter, limit, oracle, bounds)
                    .await?
            }
            ResolverStrategy::RootFinding { max_iterations } => {
                self.resolve_by_root_finding(geometry, filter, limit, oracle, max_iterations)
                    .await?
            }
        };

        tracing::debug!(limit, ?resolution, strategy = ?self.strategy, "resolved cluster level");
        Ok(resolution)
    }

    async fn resolve_by_regression<O: CountOracle + ?Sized>(
        &self,
        geometry: &BoxPolygon,
        filter: &StationFilter,
        limit: u64,
        oracle: &O,
        bounds: DensityBounds,
    ) -> Result<LevelResolution> {
        let levels = REGRESSION_SAMPLES.map(|t| bounds.interpolate(t).floor() as i64);

        let counts = try_join_all(
            levels
                .iter()
                .map(|&level| self.count_at(oracle, geometry, Some(level), filter)),
        )
        .await?;

        let mut samples: Vec<(i64, u64)> = levels.into_iter().zip(counts).collect();
        check_monotonic(&mut samples)?;
        tracing::trace!(?samples, "regression samples");

        // Even the coarsest filter cannot reach the limit
        if samples.last().is_some_and(|&(_, count)| limit > count) {
            return Ok(LevelResolution::NotFound);
        }

        let Some((slope, intercept)) = least_squares(&samples) else {
            return Ok(LevelResolution::NotFound);
        };
        if slope == 0.0 {
            return Ok(LevelResolution::NotFound);
        }

        let level = (limit as f64 - intercept) / slope;
        if !level.is_finite() {
            return Ok(LevelResolution::NotFound);
        }
        let level = level.max(bounds.min() as f64);
        if level > bounds.max() as f64 {
            return Ok(LevelResolution::NotFound);
        }

        Ok(LevelResolution::Found(level.floor() as i64))
    }

    async fn resolve_by_root_finding<O: CountOracle + ?Sized>(
        &self,
        geometry: &BoxPolygon,
        filter: &StationFilter,
        limit: u64,
        oracle: &O,
        max_iterations: u32,
    ) -> Result<LevelResolution> {
        let upper = self.count_at(oracle, geometry, None, filter).await?;
        if upper < 1 {
            return Ok(LevelResolution::NotFound);
        }

        let mut samples = Vec::with_capacity(max_iterations as usize + 2);
        let target = Target {
            geometry,
            filter,
            limit,
        };

        let mut xpre = 1.0_f64;
        let mut xcur = upper as f64;
        let mut fpre = self.excess(oracle, &target, xpre, &mut samples).await?;
        let mut fcur = self.excess(oracle, &target, xcur, &mut samples).await?;

        let root = if fpre == 0.0 {
            Some(xpre)
        } else if fcur == 0.0 {
            Some(xcur)
        } else if fpre.is_sign_negative() == fcur.is_sign_negative() {
            None
        } else {
            let (mut xblk, mut fblk) = (0.0_f64, 0.0_f64);
            let (mut spre, mut scur) = (0.0_f64, 0.0_f64);

            for _ in 0..max_iterations {
                if fpre != 0.0 && fcur != 0.0 && fpre.is_sign_negative() != fcur.is_sign_negative()
                {
                    xblk = xpre;
                    fblk = fpre;
                    spre = xcur - xpre;
                    scur = spre;
                }
                if fblk.abs() < fcur.abs() {
                    xpre = xcur;
                    xcur = xblk;
                    xblk = xpre;
                    fpre = fcur;
                    fcur = fblk;
                    fblk = fpre;
                }

                let delta = (XTOL + RTOL * xcur.abs()) / 2.0;
                let sbis = (xblk - xcur) / 2.0;
                if fcur == 0.0 || sbis.abs() < delta {
                    break;
                }

                if spre.abs() > delta && fcur.abs() < fpre.abs() {
                    let stry = if xpre == xblk {
                        // secant
                        -fcur * (xcur - xpre) / (fcur - fpre)
                    } else {
                        // inverse quadratic
                        let dpre = (fpre - fcur) / (xpre - xcur);
                        let dblk = (fblk - fcur) / (xblk - xcur);
                        -fcur * (fblk * dblk - fpre * dpre) / (dblk * dpre * (fblk - fpre))
                    };
                    if 2.0 * stry.abs() < spre.abs().min(3.0 * sbis.abs() - delta) {
                        spre = scur;
                        scur = stry;
                    } else {
                        spre = sbis;
                        scur = sbis;
                    }
                } else {
                    spre = sbis;
                    scur = sbis;
                }

                xpre = xcur;
                fpre = fcur;
                xcur += if scur.abs() > delta {
                    scur
                } else if sbis > 0.0 {
                    delta
                } else {
                    -delta
                };
                fcur = self.excess(oracle, &target, xcur, &mut samples).await?;
            }
            Some(xcur)
        };

        check_monotonic(&mut samples)?;
        tracing::trace!(?samples, upper, "root finding samples");

        Ok(match root {
            Some(level) if level.is_finite() => LevelResolution::Found(level.floor() as i64),
            _ => LevelResolution::NotFound,
        })
    }

    /// `count(level) - limit`, recording the sample
    async fn excess<O: CountOracle + ?Sized>(
        &self,
        oracle: &O,
        target: &Target<'_>,
        level: f64,
        samples: &mut Vec<(i64, u64)>,
    ) -> Result<f64> {
        let level = level.floor() as i64;
        let count = self
            .count_at(oracle, target.geometry, Some(level), target.filter)
            .await?;
        samples.push((level, count));
        Ok(count as f64 - target.limit as f64)
    }

    async fn count_at<O: CountOracle + ?Sized>(
        &self,
        oracle: &O,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
    ) -> Result<u64> {
        self.timed(oracle.count(geometry, max_level, filter)).await
    }

    /// Await an oracle call under the configured timeout
    async fn timed<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.oracle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| DataError::OracleTimeout(timeout))?,
            None => call.await,
        }
    }
}

/// What a root search is solving for
struct Target<'a> {
    geometry: &'a BoxPolygon,
    filter: &'a StationFilter,
    limit: u64,
}

/// Sort samples by level and reject any count that decreases as the level grows
fn check_monotonic(samples: &mut [(i64, u64)]) -> Result<()> {
    samples.sort_unstable_by_key(|&(level, _)| level);
    for pair in samples.windows(2) {
        let (lower_level, lower_count) = pair[0];
        let (upper_level, upper_count) = pair[1];
        if lower_count > upper_count {
            tracing::warn!(
                lower_level,
                lower_count,
                upper_level,
                upper_count,
                "count oracle violated monotonicity"
            );
            return Err(DataError::NonMonotonicCounts {
                lower_level,
                lower_count,
                upper_level,
                upper_count,
            });
        }
    }
    Ok(())
}

/// Ordinary least-squares line `y = slope * x + intercept`
///
/// `None` when all x values coincide.
fn least_squares(samples: &[(i64, u64)]) -> Option<(f64, f64)> {
    let n = samples.len() as f64;
    if n == 0.0 {
        return None;
    }
    let mean_x = samples.iter().map(|&(x, _)| x as f64).sum::<f64>() / n;
    let mean_y = samples.iter().map(|&(_, y)| y as f64).sum::<f64>() / n;

    let (sxx, sxy) = samples.iter().fold((0.0, 0.0), |(sxx, sxy), &(x, y)| {
        let dx = x as f64 - mean_x;
        (sxx + dx * dx, sxy + dx * (y as f64 - mean_y))
    });
    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoundingBox, BoxPolygonBuilder};
    use async_trait::async_trait;
    use geo::Coord;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Count oracle driven by a closure over the level upper bound
    struct ScriptedOracle<F> {
        count_fn: F,
        calls: AtomicUsize,
        levels: Mutex<Vec<Option<i64>>>,
        delay: Option<Duration>,
    }

    impl<F: Fn(Option<i64>) -> u64 + Send + Sync> ScriptedOracle<F> {
        fn new(count_fn: F) -> Self {
            Self {
                count_fn,
                calls: AtomicUsize::new(0),
                levels: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<F: Fn(Option<i64>) -> u64 + Send + Sync> CountOracle for ScriptedOracle<F> {
        async fn count(
            &self,
            _geometry: &BoxPolygon,
            max_level: Option<i64>,
            _filter: &StationFilter,
        ) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.levels.lock().unwrap().push(max_level);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok((self.count_fn)(max_level))
        }
    }

    /// Bounds oracle counting its reads, optionally slow
    struct CountingBounds {
        bounds: DensityBounds,
        reads: AtomicUsize,
        delay: Option<Duration>,
    }

    impl CountingBounds {
        fn new(bounds: DensityBounds) -> Self {
            Self {
                bounds,
                reads: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BoundsOracle for CountingBounds {
        async fn bounds(&self) -> Result<DensityBounds> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.bounds)
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl CountOracle for FailingOracle {
        async fn count(
            &self,
            _geometry: &BoxPolygon,
            _max_level: Option<i64>,
            _filter: &StationFilter,
        ) -> Result<u64> {
            Err(DataError::Oracle("backing store unavailable".into()))
        }
    }

    /// count = clamp(intercept + slope * level, 0, total); no level filter = total
    fn linear(slope: f64, intercept: f64, total: u64) -> impl Fn(Option<i64>) -> u64 {
        move |level| match level {
            Some(level) => (intercept + slope * level as f64).clamp(0.0, total as f64) as u64,
            None => total,
        }
    }

    fn test_polygon() -> BoxPolygon {
        let bbox =
            BoundingBox::new(Coord { x: 4.0, y: 45.0 }, Coord { x: 8.0, y: 48.0 }).unwrap();
        BoxPolygonBuilder::default().build(&bbox)
    }

    fn bounds(min: i64, max: i64) -> DensityBounds {
        DensityBounds::new(min, max).unwrap()
    }

    async fn regression<O: CountOracle>(
        oracle: &O,
        limit: u64,
        bounds: DensityBounds,
    ) -> Result<LevelResolution> {
        ClusterLevelResolver::new(ResolverStrategy::Regression)
            .resolve(
                &test_polygon(),
                &StationFilter::default(),
                limit,
                oracle,
                bounds,
            )
            .await
    }

    async fn root_finding<O: CountOracle>(
        oracle: &O,
        limit: u64,
        max_iterations: u32,
    ) -> Result<LevelResolution> {
        ClusterLevelResolver::new(ResolverStrategy::RootFinding { max_iterations })
            .resolve(
                &test_polygon(),
                &StationFilter::default(),
                limit,
                oracle,
                bounds(0, 100),
            )
            .await
    }

    #[test]
    fn test_least_squares_collinear() {
        let (slope, intercept) = least_squares(&[(0, 10), (50, 110), (100, 210)]).unwrap();
        assert_eq!(slope, 2.0);
        assert_eq!(intercept, 10.0);
    }

    #[test]
    fn test_least_squares_degenerate() {
        assert!(least_squares(&[(5, 10), (5, 20), (5, 30)]).is_none());
        assert!(least_squares(&[]).is_none());
    }

    #[test]
    fn test_check_monotonic_sorts_samples() {
        let mut samples = vec![(50, 20), (0, 10), (100, 30)];
        assert!(check_monotonic(&mut samples).is_ok());
        assert_eq!(samples, vec![(0, 10), (50, 20), (100, 30)]);
    }

    #[test]
    fn test_level_resolution_level() {
        assert_eq!(LevelResolution::Found(8).level(), Some(8));
        assert_eq!(LevelResolution::NotFound.level(), None);
    }

    #[tokio::test]
    async fn test_regression_collinear_matches_closed_form() {
        let oracle = ScriptedOracle::new(linear(2.0, 10.0, 1_000));
        let resolution = regression(&oracle, 30, bounds(0, 100)).await.unwrap();
        // (30 - 10) / 2
        assert_eq!(resolution, LevelResolution::Found(10));
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn test_regression_clamps_to_min() {
        let oracle = ScriptedOracle::new(linear(2.0, 10.0, 1_000));
        let resolution = regression(&oracle, 5, bounds(0, 100)).await.unwrap();
        assert_eq!(resolution, LevelResolution::Found(0));
    }

    #[tokio::test]
    async fn test_regression_fits_irregular_samples() {
        // counts [10, 60, 500] at levels [0, 50, 100]: slope 4.9, intercept -55
        let oracle = ScriptedOracle::new(|level| match level {
            Some(l) if l < 50 => 10,
            Some(l) if l < 100 => 60,
            _ => 500,
        });
        let resolution = regression(&oracle, 50, bounds(0, 100)).await.unwrap();
        assert_eq!(resolution, LevelResolution::Found(21));
    }

    #[tokio::test]
    async fn test_regression_limit_above_max_count() {
        let oracle = ScriptedOracle::new(linear(2.0, 10.0, 1_000));
        // count at max level is 210
        let resolution = regression(&oracle, 300, bounds(0, 100)).await.unwrap();
        assert_eq!(resolution, LevelResolution::NotFound);
    }

    #[tokio::test]
    async fn test_regression_limit_above_max_count_with_concave_counts() {
        // Fit would land inside the range, but count(max) = 100 < limit
        let oracle = ScriptedOracle::new(|level| match level {
            Some(0) => 0,
            _ => 100,
        });
        let resolution = regression(&oracle, 110, bounds(0, 100)).await.unwrap();
        assert_eq!(resolution, LevelResolution::NotFound);
    }

    #[tokio::test]
    async fn test_regression_zero_slope() {
        let oracle = ScriptedOracle::new(|_| 40);
        let resolution = regression(&oracle, 30, bounds(0, 100)).await.unwrap();
        assert_eq!(resolution, LevelResolution::NotFound);
    }

    #[tokio::test]
    async fn test_regression_single_level_range() {
        let oracle = ScriptedOracle::new(linear(1.0, 0.0, 1_000));
        let resolution = regression(&oracle, 3, bounds(7, 7)).await.unwrap();
        assert_eq!(resolution, LevelResolution::NotFound);
    }

    #[tokio::test]
    async fn test_regression_samples_span_bounds() {
        let oracle = ScriptedOracle::new(linear(1.0, 0.0, 1_000));
        regression(&oracle, 10, bounds(3, 8)).await.unwrap();

        let mut levels = oracle.levels.lock().unwrap().clone();
        levels.sort();
        assert_eq!(levels, vec![Some(3), Some(5), Some(8)]);
    }

    #[tokio::test]
    async fn test_regression_result_within_bounds() {
        for slope in [0.5, 1.0, 3.0, 10.0] {
            for limit in [1, 5, 20, 50, 100, 400] {
                let oracle = ScriptedOracle::new(linear(slope, 5.0, 10_000));
                let resolution = regression(&oracle, limit, bounds(2, 60)).await.unwrap();
                if let LevelResolution::Found(level) = resolution {
                    assert!((2..=60).contains(&level), "slope {slope} limit {limit}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_regression_rejects_non_monotonic_oracle() {
        let oracle = ScriptedOracle::new(|level| match level {
            Some(l) if l < 50 => 100,
            Some(l) if l < 100 => 50,
            _ => 10,
        });
        let result = regression(&oracle, 20, bounds(0, 100)).await;
        assert!(matches!(
            result,
            Err(DataError::NonMonotonicCounts {
                lower_level: 0,
                lower_count: 100,
                upper_level: 50,
                upper_count: 50,
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_regression_issues_samples_concurrently() {
        let oracle =
            ScriptedOracle::new(linear(2.0, 10.0, 1_000)).with_delay(Duration::from_millis(100));
        let started = tokio::time::Instant::now();
        regression(&oracle, 30, bounds(0, 100)).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_timeout() {
        let oracle = ScriptedOracle::new(|_| 10).with_delay(Duration::from_secs(10));
        let resolver = ClusterLevelResolver::new(ResolverStrategy::Regression)
            .with_oracle_timeout(Duration::from_secs(1));
        let result = resolver
            .resolve(
                &test_polygon(),
                &StationFilter::default(),
                5,
                &oracle,
                bounds(0, 100),
            )
            .await;
        assert!(matches!(result, Err(DataError::OracleTimeout(d)) if d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_oracle_failure_propagates() {
        let result = regression(&FailingOracle, 5, bounds(0, 100)).await;
        assert!(matches!(result, Err(DataError::Oracle(_))));

        let result = root_finding(&FailingOracle, 5, 2).await;
        assert!(matches!(result, Err(DataError::Oracle(_))));
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let oracle = ScriptedOracle::new(|_| 10);
        let result = regression(&oracle, 0, bounds(0, 100)).await;
        assert!(matches!(result, Err(DataError::InvalidLimit(0))));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_root_finding_linear() {
        let oracle = ScriptedOracle::new(linear(1.0, 0.0, 1_000));
        let resolution = root_finding(&oracle, 50, 2).await.unwrap();
        assert_eq!(resolution, LevelResolution::Found(50));
    }

    #[tokio::test]
    async fn test_root_finding_bounds_oracle_calls() {
        let oracle = ScriptedOracle::new(|level| match level {
            Some(l) => ((l.max(0) as f64).sqrt() * 10.0) as u64,
            None => 1_000,
        });
        let resolution = root_finding(&oracle, 50, 2).await.unwrap();
        assert!(matches!(resolution, LevelResolution::Found(level) if (1..=1_000).contains(&level)));
        // total + two bracket ends + one per iteration
        assert!(oracle.calls() <= 5);
    }

    #[tokio::test]
    async fn test_root_finding_more_iterations_converge() {
        let count_fn = |level: Option<i64>| match level {
            Some(l) => ((l.max(0) as f64).sqrt() * 10.0) as u64,
            None => 1_000,
        };
        let oracle = ScriptedOracle::new(count_fn);
        let resolution = root_finding(&oracle, 50, 50).await.unwrap();
        let level = resolution.level().unwrap();
        // sqrt(level) * 10 == 50 around level 25
        assert!((24..=26).contains(&level), "level {level}");
    }

    #[tokio::test]
    async fn test_root_finding_limit_above_total() {
        let oracle = ScriptedOracle::new(linear(1.0, 0.0, 30));
        let resolution = root_finding(&oracle, 50, 2).await.unwrap();
        assert_eq!(resolution, LevelResolution::NotFound);
    }

    #[tokio::test]
    async fn test_root_finding_limit_below_first_level() {
        let oracle = ScriptedOracle::new(linear(1.0, 100.0, 1_000));
        let resolution = root_finding(&oracle, 50, 2).await.unwrap();
        assert_eq!(resolution, LevelResolution::NotFound);
    }

    #[tokio::test]
    async fn test_root_finding_exact_at_first_level() {
        let oracle = ScriptedOracle::new(linear(1.0, 49.0, 1_000));
        let resolution = root_finding(&oracle, 50, 2).await.unwrap();
        assert_eq!(resolution, LevelResolution::Found(1));
    }

    #[tokio::test]
    async fn test_root_finding_empty_box() {
        let oracle = ScriptedOracle::new(|_| 0);
        let resolution = root_finding(&oracle, 50, 2).await.unwrap();
        assert_eq!(resolution, LevelResolution::NotFound);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_root_finding_never_reads_bounds() {
        let oracle = ScriptedOracle::new(linear(1.0, 0.0, 1_000));
        let bounds_oracle = CountingBounds::new(bounds(0, 100));
        let resolution = ClusterLevelResolver::new(ResolverStrategy::root_finding())
            .resolve_from(
                &test_polygon(),
                &StationFilter::default(),
                50,
                &oracle,
                &bounds_oracle,
            )
            .await
            .unwrap();
        assert_eq!(resolution, LevelResolution::Found(50));
        assert_eq!(bounds_oracle.reads(), 0);
    }

    #[tokio::test]
    async fn test_regression_reads_bounds_once() {
        let oracle = ScriptedOracle::new(linear(2.0, 10.0, 1_000));
        let bounds_oracle = CountingBounds::new(bounds(0, 100));
        let resolver = ClusterLevelResolver::new(ResolverStrategy::Regression);
        let resolution = resolver
            .resolve_from(
                &test_polygon(),
                &StationFilter::default(),
                30,
                &oracle,
                &bounds_oracle,
            )
            .await
            .unwrap();
        assert_eq!(resolution, LevelResolution::Found(10));
        assert_eq!(bounds_oracle.reads(), 1);

        // an invalid limit reads nothing
        let result = resolver
            .resolve_from(
                &test_polygon(),
                &StationFilter::default(),
                0,
                &oracle,
                &bounds_oracle,
            )
            .await;
        assert!(matches!(result, Err(DataError::InvalidLimit(0))));
        assert_eq!(bounds_oracle.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounds_read_timeout() {
        let oracle = ScriptedOracle::new(|_| 10);
        let bounds_oracle = CountingBounds {
            delay: Some(Duration::from_secs(10)),
            ..CountingBounds::new(bounds(0, 100))
        };
        let result = ClusterLevelResolver::new(ResolverStrategy::Regression)
            .with_oracle_timeout(Duration::from_secs(1))
            .resolve_from(
                &test_polygon(),
                &StationFilter::default(),
                5,
                &oracle,
                &bounds_oracle,
            )
            .await;
        assert!(matches!(result, Err(DataError::OracleTimeout(_))));
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn test_strategy_defaults() {
        assert_eq!(ResolverStrategy::default(), ResolverStrategy::Regression);
        assert_eq!(
            ResolverStrategy::root_finding(),
            ResolverStrategy::RootFinding { max_iterations: 2 }
        );
        let resolver = ClusterLevelResolver::default();
        assert_eq!(resolver.strategy(), ResolverStrategy::Regression);
        assert!(resolver.oracle_timeout().is_none());
    }
}
