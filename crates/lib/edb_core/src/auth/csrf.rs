//! CSRF tokens for cookie-authenticated routes.

use std::fmt;

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::AuthError;

/// Request header carrying the client's copy of the token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// 32 random bytes, URL-safe base64 without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfToken(<redacted>)")
    }
}

/// Generates a new token.
pub fn issue() -> CsrfToken {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    CsrfToken(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Compares the stored and submitted tokens by digest. Either missing is a mismatch.
pub fn validate(expected: Option<&str>, submitted: Option<&str>) -> Result<(), AuthError> {
    match (expected, submitted) {
        (Some(expected), Some(submitted))
            if !expected.is_empty()
                && Sha256::digest(expected.as_bytes()) == Sha256::digest(submitted.as_bytes()) =>
        {
            Ok(())
        }
        _ => Err(AuthError::CsrfMismatch),
    }
}
