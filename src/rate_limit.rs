//! Sliding window rate limit built from per-second counters.
//!
//! Every token-less request bumps the counter for its client and calendar
//! second. The decision sums the counters of the trailing `window` seconds,
//! the current one included, so a request always counts toward its own
//! check. Counters expire in the store after `window` seconds, which bounds
//! memory at `window` live keys per client without any cleanup pass.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::trace;

use crate::error::StoreError;
use crate::store::CounterStore;

const KEY_PREFIX: &str = "threshold";
const KEY_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

// Counter key for one client in one calendar second
pub fn counter_key(client: &str, at: DateTime<Utc>) -> String {
    format!("{KEY_PREFIX}_{client}_{}", at.format(KEY_TIME_FORMAT))
}

pub struct RateLimiter<S> {
    store: S,
    limit: u64,
    window_secs: u64,
}

impl<S: CounterStore> RateLimiter<S> {
    pub fn new(store: S, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window_secs: window.as_secs().max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Keys of the buckets making up the window ending at `now`, newest first.
    pub fn window_keys(&self, client: &str, now: DateTime<Utc>) -> Vec<String> {
        (0..self.window_secs)
            .map(|offset| counter_key(client, now - TimeDelta::seconds(offset as i64)))
            .collect()
    }

    /// Record one request for `client` in the bucket for `now`.
    pub async fn record(&self, client: &str, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let key = counter_key(client, now);
        self.store.add(&key, 0, self.window()).await?;
        match self.store.incr(&key, 1).await? {
            Some(count) => Ok(count),
            // bucket vanished between add and incr (expiry or eviction)
            None => {
                if self.store.add(&key, 1, self.window()).await? {
                    return Ok(1);
                }
                Ok(self.store.incr(&key, 1).await?.unwrap_or(1))
            }
        }
    }

    /// Sum of all live buckets in the window ending at `now`.
    pub async fn window_total(&self, client: &str, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let keys = self.window_keys(client, now);
        let counters = self.store.get_multi(&keys).await?;
        Ok(counters.values().sum())
    }

    /// Record the current request, then report whether the client is over the limit.
    pub async fn is_threshold_exceeded(
        &self,
        client: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let bucket = self.record(client, now).await?;
        let total = self.window_total(client, now).await?;
        trace!(client, bucket, total, limit = self.limit, "rate window evaluated");
        Ok(total > self.limit)
    }
}
