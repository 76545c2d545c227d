// @zen-component: AUTH-OtpService
//
//! Short numeric one-time passcodes for email sign-in.
//!
//! Codes live in the TTL cache under `otp:<identifier>`; generation is
//! rate limited by a counter under `otp:attempts:<identifier>` whose
//! expiry is the rate-limit window.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::AuthError;
use crate::cache::TtlCache;

pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_ATTEMPTS: u64 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const CODE_LENGTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpConfig {
    /// How long an issued code can be used.
    pub code_ttl: Duration,
    /// Codes a single identifier may request per window.
    pub max_attempts: u64,
    pub window: Duration,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_ttl: DEFAULT_CODE_TTL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_WINDOW,
        }
    }
}

pub struct OtpService {
    cache: Arc<dyn TtlCache>,
    config: OtpConfig,
}

fn code_key(identifier: &str) -> String {
    format!("otp:{identifier}")
}

fn attempts_key(identifier: &str) -> String {
    format!("otp:attempts:{identifier}")
}

/// Email identifiers are case-insensitive.
fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

fn codes_match(expected: &str, submitted: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(submitted.as_bytes())
}

impl OtpService {
    pub fn new(cache: Arc<dyn TtlCache>, config: OtpConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Issues a fresh code for `identifier`, replacing any outstanding one.
    pub async fn generate(&self, identifier: &str) -> Result<String, AuthError> {
        let identifier = normalize(identifier);

        let attempts = self
            .cache
            .incr_with_expiry(&attempts_key(&identifier), self.config.window)
            .await?;
        if attempts > self.config.max_attempts {
            warn!(identifier = %identifier, attempts, "otp rate limit exceeded");
            return Err(AuthError::RateLimitExceeded);
        }

        let code = generate_code();
        self.cache
            .set_with_expiry(&code_key(&identifier), &code, self.config.code_ttl)
            .await?;
        debug!(identifier = %identifier, attempts, "otp issued");
        Ok(code)
    }

    /// Consumes the code for `identifier` if `code` matches it.
    ///
    /// A wrong code leaves the stored one in place. A matching code is
    /// deleted, so each code validates at most once.
    pub async fn validate(&self, identifier: &str, code: &str) -> Result<(), AuthError> {
        let identifier = normalize(identifier);
        let key = code_key(&identifier);

        let stored = self
            .cache
            .get(&key)
            .await?
            .ok_or(AuthError::OtpExpired)?;

        if !codes_match(&stored, code.trim()) {
            debug!(identifier = %identifier, "otp mismatch");
            return Err(AuthError::OtpInvalid);
        }

        // Whoever deletes the key owns the code.
        if !self.cache.delete(&key).await? {
            return Err(AuthError::OtpExpired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTtlCache;

    fn service(config: OtpConfig) -> OtpService {
        OtpService::new(Arc::new(MemoryTtlCache::new()), config)
    }

    #[tokio::test]
    async fn generates_six_digit_codes() {
        let otp = service(OtpConfig::default());
        let code = otp.generate("bob@example.com").await.unwrap();
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn a_code_validates_at_most_once() {
        let otp = service(OtpConfig::default());
        let code = otp.generate("bob@example.com").await.unwrap();
        otp.validate("bob@example.com", &code).await.unwrap();
        assert!(matches!(
            otp.validate("bob@example.com", &code).await,
            Err(AuthError::OtpExpired)
        ));
    }

    #[tokio::test]
    async fn identifier_is_case_insensitive() {
        let otp = service(OtpConfig::default());
        let code = otp.generate("Bob@Example.com").await.unwrap();
        otp.validate("bob@example.com", &code).await.unwrap();
    }

    #[tokio::test]
    async fn wrong_code_is_invalid_and_keeps_the_real_one() {
        let otp = service(OtpConfig::default());
        let code = otp.generate("bob@example.com").await.unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert!(matches!(
            otp.validate("bob@example.com", wrong).await,
            Err(AuthError::OtpInvalid)
        ));
        otp.validate("bob@example.com", &code).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_identifier_is_expired() {
        let otp = service(OtpConfig::default());
        assert!(matches!(
            otp.validate("nobody@example.com", "123456").await,
            Err(AuthError::OtpExpired)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn code_expires_after_its_ttl() {
        let otp = service(OtpConfig {
            code_ttl: Duration::from_secs(60),
            ..OtpConfig::default()
        });
        let code = otp.generate("bob@example.com").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(
            otp.validate("bob@example.com", &code).await,
            Err(AuthError::OtpExpired)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn generation_is_rate_limited_per_window() {
        let otp = service(OtpConfig {
            max_attempts: 3,
            window: Duration::from_secs(900),
            ..OtpConfig::default()
        });
        for _ in 0..3 {
            otp.generate("bob@example.com").await.unwrap();
        }
        assert!(matches!(
            otp.generate("bob@example.com").await,
            Err(AuthError::RateLimitExceeded)
        ));
        // Other identifiers have their own counter.
        otp.generate("alice@example.com").await.unwrap();

        tokio::time::advance(Duration::from_secs(901)).await;
        otp.generate("bob@example.com").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_codes_do_not_pile_up_in_memory() {
        let cache = Arc::new(MemoryTtlCache::new());
        let otp = OtpService::new(cache.clone(), OtpConfig::default());
        for i in 0..1000 {
            otp.generate(&format!("user{i}@example.com")).await.unwrap();
        }
        assert_eq!(cache.len(), 2000);

        tokio::time::advance(Duration::from_secs(24 * 3600)).await;
        otp.generate("late@example.com").await.unwrap();
        assert!(cache.len() <= 2, "{} entries left", cache.len());
    }
}
