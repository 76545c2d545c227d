//! Authentication and authorization logic.
//!
//! Token issuance and parsing, password hashing, one-time passcodes, CSRF
//! tokens, session payloads, external identity verification and the
//! validator chain that composes them for `edb_api`.

pub mod csrf;
pub mod identity;
pub mod otp;
pub mod password;
pub mod roles;
pub mod session;
pub mod tokens;
pub mod validator;

use thiserror::Error;

use crate::cache::CacheError;
use crate::mail::MailError;
use crate::models::auth::TokenKind;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Wrong token type: expected {expected}, got {actual}")]
    WrongTokenKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("No token claims on request")]
    MissingClaims,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid credentials")]
    CredentialError,

    #[error("An account with that username or email already exists")]
    AccountExists,

    #[error("Email address not verified")]
    EmailNotVerified,

    #[error("User is not allowed to sign in")]
    NotAllowedToSignIn,

    #[error("Too many requests, try again later")]
    RateLimitExceeded,

    #[error("Invalid one-time passcode")]
    OtpInvalid,

    #[error("One-time passcode expired or not found")]
    OtpExpired,

    #[error("No valid session")]
    SessionNotFound,

    #[error("CSRF token mismatch")]
    CsrfMismatch,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            _ => AuthError::InvalidToken(e.to_string()),
        }
    }
}
