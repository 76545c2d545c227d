// @zen-component: AUTH-SessionManager
//
//! Session cookie settings and the versioned session payload.
//!
//! The payload is plain JSON; confidentiality and integrity come from the
//! private (encrypted) cookie jar it is stored in.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AuthError;
use crate::models::auth::{AuthUser, SessionInfo};

/// Version written into new payloads. Payloads with any other version are
/// treated as absent.
pub const SESSION_PAYLOAD_VERSION: u32 = 1;

pub const DEFAULT_SESSION_COOKIE: &str = "edb-session";
pub const DEFAULT_CSRF_COOKIE: &str = "edb-csrf";
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

impl FromStr for SameSitePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSitePolicy::Strict),
            "lax" => Ok(SameSitePolicy::Lax),
            "none" => Ok(SameSitePolicy::None),
            other => Err(format!("unknown SameSite policy '{other}'")),
        }
    }
}

/// Session cookie attributes and lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub csrf_cookie_name: String,
    /// Upper bound on a session's life. Also the cookie `Max-Age` when the
    /// user chose to stay signed in.
    pub ttl: Duration,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSitePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            csrf_cookie_name: DEFAULT_CSRF_COOKIE.to_string(),
            ttl: DEFAULT_SESSION_TTL,
            domain: None,
            secure: true,
            same_site: SameSitePolicy::None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionPayload {
    v: u32,
    user: AuthUser,
    created_at: i64,
    expires_at: i64,
    #[serde(default)]
    stay_signed_in: bool,
}

#[derive(Deserialize)]
struct VersionTag {
    v: Option<u32>,
}

/// Starts a session window at `now`.
pub fn new_session(
    user: &AuthUser,
    stay_signed_in: bool,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<SessionInfo, AuthError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| AuthError::Internal(format!("session ttl out of range: {e}")))?;
    Ok(SessionInfo {
        user: user.clone(),
        created_at: now,
        expires_at: now + ttl,
        stay_signed_in,
    })
}

pub fn encode(info: &SessionInfo) -> Result<String, AuthError> {
    let payload = SessionPayload {
        v: SESSION_PAYLOAD_VERSION,
        user: info.user.clone(),
        created_at: info.created_at.timestamp(),
        expires_at: info.expires_at.timestamp(),
        stay_signed_in: info.stay_signed_in,
    };
    serde_json::to_string(&payload)
        .map_err(|e| AuthError::Internal(format!("encode session: {e}")))
}

/// Decodes a cookie value. Anything unreadable, from another payload
/// version, or past its `expires_at` is [`AuthError::SessionNotFound`].
pub fn decode(raw: &str, now: DateTime<Utc>) -> Result<SessionInfo, AuthError> {
    let tag: VersionTag =
        serde_json::from_str(raw).map_err(|_| AuthError::SessionNotFound)?;
    if tag.v != Some(SESSION_PAYLOAD_VERSION) {
        debug!(version = ?tag.v, "ignoring session payload with unknown version");
        return Err(AuthError::SessionNotFound);
    }

    let payload: SessionPayload =
        serde_json::from_str(raw).map_err(|_| AuthError::SessionNotFound)?;
    let created_at = timestamp(payload.created_at)?;
    let expires_at = timestamp(payload.expires_at)?;
    if expires_at <= now {
        return Err(AuthError::SessionNotFound);
    }

    Ok(SessionInfo {
        user: payload.user,
        created_at,
        expires_at,
        stay_signed_in: payload.stay_signed_in,
    })
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(AuthError::SessionNotFound)
}
