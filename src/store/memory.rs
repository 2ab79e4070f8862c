use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::CounterStore;
use crate::error::StoreError;

// Counter with its expiry deadline
#[derive(Clone, Debug)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

impl CounterEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local counter store.
///
/// Each operation runs under the map's per-shard lock, so concurrent
/// increments on one key never lose updates. Expired entries are treated as
/// absent on access and removed by [`MemoryStore::purge_expired`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, CounterEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Live entries only
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired counters. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    // Sweep expired counters until cancelled
    pub async fn sweeper(self, every: Duration, shutdown: CancellationToken) {
        let mut interval = interval(every);

        info!(interval = ?every, "memory store sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let removed = self.purge_expired();
                    if removed > 0 {
                        debug!(removed, remaining = self.entries.len(), "expired counters purged");
                    }
                }
            }
        }
    }
}

impl CounterStore for MemoryStore {
    async fn add(&self, key: &str, initial: u64, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let fresh = CounterEntry {
            count: initial,
            expires_at: now + ttl,
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(e) if e.get().is_live(now) => Ok(false),
            Entry::Occupied(mut e) => {
                e.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(e) => {
                e.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut e) if e.get().is_live(now) => {
                let entry = e.get_mut();
                entry.count = entry.count.wrapping_add(delta);
                Ok(Some(entry.count))
            }
            Entry::Occupied(e) => {
                e.remove();
                Ok(None)
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, u64>, StoreError> {
        let now = Instant::now();
        let found = keys
            .iter()
            .filter_map(|key| {
                self.entries
                    .get(key)
                    .filter(|entry| entry.is_live(now))
                    .map(|entry| (key.clone(), entry.count))
            })
            .collect();
        Ok(found)
    }
}
