use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::PricePoint;

use super::{PriceError, PriceSource};

/// One fetched day of prices together with its fetch time.
#[derive(Debug, Clone)]
pub struct CachedDay {
    pub points: Vec<PricePoint>,
    pub fetched_at: DateTime<Utc>,
}

/// Storage for fetched price days, keyed by calendar date.
pub trait PriceCache: Send + Sync {
    fn get(&self, date: NaiveDate) -> Option<CachedDay>;
    fn put(&self, date: NaiveDate, points: Vec<PricePoint>, fetched_at: DateTime<Utc>);
}

/// In-process cache. One run reads then writes each date at most once,
/// so a plain mutex around the map is enough.
#[derive(Default)]
pub struct MemoryPriceCache {
    days: Mutex<HashMap<NaiveDate, CachedDay>>,
}

impl MemoryPriceCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PriceCache for MemoryPriceCache {
    fn get(&self, date: NaiveDate) -> Option<CachedDay> {
        self.days.lock().get(&date).cloned()
    }

    fn put(&self, date: NaiveDate, points: Vec<PricePoint>, fetched_at: DateTime<Utc>) {
        self.days.lock().insert(date, CachedDay { points, fetched_at });
    }
}

/// How long a cached day stays servable without a refetch. Tuned to the
/// pricing API's call-rate limit.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    pub max_age: Duration,
}

impl FreshnessPolicy {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(fetched_at);
        age.num_seconds() < self.max_age.as_secs() as i64
    }
}

/// Caching decorator for a price source.
///
/// Serves fresh cache hits without a fetch. On a rate-limit response the
/// last cached day is served regardless of age; any other failure
/// propagates.
pub struct CachedPriceSource<S> {
    inner: S,
    cache: Arc<dyn PriceCache>,
    freshness: FreshnessPolicy,
}

impl<S: PriceSource> CachedPriceSource<S> {
    pub fn new(inner: S, cache: Arc<dyn PriceCache>, freshness: FreshnessPolicy) -> Self {
        Self {
            inner,
            cache,
            freshness,
        }
    }
}

#[async_trait]
impl<S: PriceSource> PriceSource for CachedPriceSource<S> {
    async fn day_prices(&self, date: NaiveDate) -> Result<Vec<PricePoint>, PriceError> {
        let now = Utc::now();
        if let Some(day) = self.cache.get(date) {
            if self.freshness.is_fresh(day.fetched_at, now) {
                debug!(%date, "serving cached prices");
                return Ok(day.points);
            }
        }

        match self.inner.day_prices(date).await {
            Ok(points) => {
                self.cache.put(date, points.clone(), now);
                Ok(points)
            }
            Err(PriceError::RateLimited) => {
                if let Some(day) = self.cache.get(date) {
                    warn!(%date, "rate limited, serving stale cached prices");
                    Ok(day.points)
                } else {
                    Err(PriceError::RateLimited)
                }
            }
            Err(e) => Err(e),
        }
    }
}
