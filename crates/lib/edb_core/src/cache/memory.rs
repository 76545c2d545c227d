//! In-process TTL cache.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheError, TtlCache};

/// How often writes sweep the whole map for expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// `DashMap`-backed cache.
///
/// Expired entries are evicted when their key is touched, and writes sweep
/// the whole map at most once per sweep interval, so keys that are never
/// read again do not accumulate.
///
/// Per-key operations hold the shard lock for their duration, which makes
/// `incr_with_expiry` atomic.
#[derive(Debug)]
pub struct MemoryTtlCache {
    entries: DashMap<String, CacheEntry>,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl Default for MemoryTtlCache {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryTtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Purges if the last sweep is older than the sweep interval. Must not
    /// be called while holding a reference into `entries`.
    fn maybe_sweep(&self, now: Instant) {
        let Ok(mut last) = self.last_sweep.try_lock() else {
            // Another writer is sweeping.
            return;
        };
        if now.duration_since(*last) < self.sweep_interval {
            return;
        }
        *last = now;
        drop(last);
        self.purge_expired();
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TtlCache for MemoryTtlCache {
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        self.maybe_sweep(now);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let removed = self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        if removed.is_some() {
            return Ok(None);
        }
        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let now = Instant::now();
        self.maybe_sweep(now);
        let fresh = || CacheEntry {
            value: "0".to_string(),
            expires_at: now + ttl,
        };

        let mut entry = self.entries.entry(key.to_string()).or_insert_with(fresh);
        if !entry.is_live(now) {
            *entry = fresh();
        }

        let count = entry
            .value
            .parse::<u64>()
            .map_err(|_| CacheError::NotAnInteger(key.to_string()))?
            + 1;
        entry.value = count.to_string();
        Ok(count)
    }
}
