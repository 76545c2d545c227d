// @zen-component: AUTH-TtlCache
//
//! Key/value cache with per-key expiry, backing OTP codes and rate limits.

mod memory;
#[cfg(feature = "redis")]
mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryTtlCache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisTtlCache;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Value at '{0}' is not an integer")]
    NotAnInteger(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// A string cache where every key carries its own expiry.
#[async_trait]
pub trait TtlCache: Send + Sync {
    /// Stores `value`, replacing any previous value and expiry.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Removes `key`. Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Atomically increments the counter at `key` and returns the new value.
    ///
    /// The expiry is attached when the counter is created and is not
    /// extended by later increments.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CacheError>;
}
