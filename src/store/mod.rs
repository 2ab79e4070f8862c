//! Counter stores backing the rate limiter.
//!
//! A store only needs three primitives, all atomic per key: create a counter
//! if it is absent (with an expiry), increment an existing counter, and fetch
//! many counters in one round trip. Expired counters read as absent.

mod memcached;
mod memory;

pub use memcached::MemcachedStore;
pub use memory::MemoryStore;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;

pub trait CounterStore: Send + Sync {
    /// Create `key` holding `initial` unless it already exists.
    /// Returns `true` when the counter was created.
    fn add(
        &self,
        key: &str,
        initial: u64,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Increment an existing counter. `None` when the key is absent or expired.
    fn incr(
        &self,
        key: &str,
        delta: u64,
    ) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;

    /// Fetch the counters that exist; absent keys are simply left out.
    fn get_multi(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<HashMap<String, u64>, StoreError>> + Send;
}

// Store selected at startup
pub enum Store {
    Memory(MemoryStore),
    Memcached(MemcachedStore),
}

impl Store {
    pub fn kind(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Memcached(_) => "memcached",
        }
    }
}

impl CounterStore for Store {
    async fn add(&self, key: &str, initial: u64, ttl: Duration) -> Result<bool, StoreError> {
        match self {
            Store::Memory(store) => store.add(key, initial, ttl).await,
            Store::Memcached(store) => store.add(key, initial, ttl).await,
        }
    }

    async fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>, StoreError> {
        match self {
            Store::Memory(store) => store.incr(key, delta).await,
            Store::Memcached(store) => store.incr(key, delta).await,
        }
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, u64>, StoreError> {
        match self {
            Store::Memory(store) => store.get_multi(keys).await,
            Store::Memcached(store) => store.get_multi(keys).await,
        }
    }
}
