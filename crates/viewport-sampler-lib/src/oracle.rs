//! Oracle traits consumed by the level resolver and the sampling pipeline
//!
//! The backing store is only ever seen through these traits: a count oracle that must be
//! monotonically non-decreasing in the level upper bound, a bounds oracle describing the
//! global cluster rank range, and a fetcher for the final query. Adapters are provided
//! for synchronous oracles and for caching the bounds with a time-to-live.

use crate::{BoxPolygon, DataError, Result, Station, StationField, StationFilter};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default time-to-live for cached density bounds
pub const DEFAULT_BOUNDS_TTL: Duration = Duration::from_secs(10 * 60);

/// Global (min, max) cluster rank range of the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DensityBounds {
    min: i64,
    max: i64,
}

impl DensityBounds {
    /// Create bounds, rejecting `min > max`
    pub fn new(min: i64, max: i64) -> Result<Self> {
        if min > max {
            return Err(DataError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn min(&self) -> i64 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Linear interpolation between `min` (t = 0) and `max` (t = 1)
    #[inline]
    pub fn interpolate(&self, t: f64) -> f64 {
        self.min as f64 + t * (self.max - self.min) as f64
    }
}

/// Counts stations inside a geometry, optionally restricted to a cluster level
///
/// `max_level = None` counts without any level filter. For a fixed geometry and filter
/// the count must never decrease as `max_level` grows.
#[async_trait]
pub trait CountOracle: Send + Sync {
    async fn count(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
    ) -> Result<u64>;
}

/// Reports the global cluster rank range
#[async_trait]
pub trait BoundsOracle: Send + Sync {
    async fn bounds(&self) -> Result<DensityBounds>;
}

/// Issues the final data query
///
/// Result order is unspecified. With `fields` set, only those fields (and the id) need
/// to be populated; see [`Station::project`].
#[async_trait]
pub trait StationFetcher: Send + Sync {
    async fn fetch(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
        fields: Option<&[StationField]>,
    ) -> Result<Vec<Station>>;
}

#[async_trait]
impl<T: CountOracle + ?Sized> CountOracle for Arc<T> {
    async fn count(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
    ) -> Result<u64> {
        (**self).count(geometry, max_level, filter).await
    }
}

/// Fixed bounds, for callers that already know the range
#[async_trait]
impl BoundsOracle for DensityBounds {
    async fn bounds(&self) -> Result<DensityBounds> {
        Ok(*self)
    }
}

#[async_trait]
impl<T: BoundsOracle + ?Sized> BoundsOracle for Arc<T> {
    async fn bounds(&self) -> Result<DensityBounds> {
        (**self).bounds().await
    }
}

#[async_trait]
impl<T: StationFetcher + ?Sized> StationFetcher for Arc<T> {
    async fn fetch(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
        fields: Option<&[StationField]>,
    ) -> Result<Vec<Station>> {
        (**self).fetch(geometry, max_level, filter, fields).await
    }
}

/// A count oracle that does its work synchronously on the calling thread
pub trait SyncCountOracle: Send + Sync + 'static {
    fn count_blocking(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
    ) -> Result<u64>;
}

/// Runs a [`SyncCountOracle`] on tokio's blocking pool
///
/// Keeps CPU-bound or blocking-client oracles off the async workers, so concurrently
/// handled requests are not stalled while a count runs.
#[derive(Debug)]
pub struct BlockingCountOracle<T> {
    inner: Arc<T>,
}

impl<T: SyncCountOracle> BlockingCountOracle<T> {
    pub fn new(inner: T) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: SyncCountOracle> CountOracle for BlockingCountOracle<T> {
    async fn count(
        &self,
        geometry: &BoxPolygon,
        max_level: Option<i64>,
        filter: &StationFilter,
    ) -> Result<u64> {
        let inner = Arc::clone(&self.inner);
        let geometry = geometry.clone();
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || inner.count_blocking(&geometry, max_level, &filter))
            .await?
    }
}

/// Time-to-live cache in front of a [`BoundsOracle`]
///
/// The first read after expiry refreshes the value; concurrent readers during a refresh
/// wait for it instead of issuing their own.
#[derive(Debug)]
pub struct CachedBounds<B> {
    inner: B,
    ttl: Duration,
    cached: RwLock<Option<(Instant, DensityBounds)>>,
}

impl<B: BoundsOracle> CachedBounds<B> {
    /// Cache with [`DEFAULT_BOUNDS_TTL`]
    pub fn new(inner: B) -> Self {
        Self::with_ttl(inner, DEFAULT_BOUNDS_TTL)
    }

    pub fn with_ttl(inner: B, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Drop the cached value so the next read goes to the inner oracle
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    fn fresh(&self, entry: Option<(Instant, DensityBounds)>) -> Option<DensityBounds> {
        entry.and_then(|(fetched_at, bounds)| (fetched_at.elapsed() < self.ttl).then_some(bounds))
    }
}

#[async_trait]
impl<B: BoundsOracle> BoundsOracle for CachedBounds<B> {
    async fn bounds(&self) -> Result<DensityBounds> {
        if let Some(bounds) = self.fresh(*self.cached.read().await) {
            return Ok(bounds);
        }

        let mut guard = self.cached.write().await;
        // Another task may have refreshed while we waited for the write lock
        if let Some(bounds) = self.fresh(*guard) {
            return Ok(bounds);
        }

        let bounds = self.inner.bounds().await?;
        tracing::debug!(min = bounds.min(), max = bounds.max(), "refreshed density bounds");
        *guard = Some((Instant::now(), bounds));
        Ok(bounds)
    }
}
