//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use edb_core::access::AccessError;
use edb_core::auth::AuthError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Message shown for both unknown users and bad credentials.
const USER_OR_CREDENTIALS: &str = "user not found or credentials invalid";

/// Failure envelope: `{"success": false, "error": code, "message": text}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Auth(e) => auth_parts(e),
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.clone()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.clone()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.clone()),
            AppError::Internal(_) => internal(),
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error".to_string(),
    )
}

fn auth_parts(e: &AuthError) -> (StatusCode, &'static str, String) {
    use AuthError::*;

    let message = e.to_string();
    match e {
        MalformedRequest(_) => (StatusCode::BAD_REQUEST, "malformed_request", message),
        InvalidUsername(_) => (StatusCode::BAD_REQUEST, "invalid_username", message),
        InvalidEmail(_) => (StatusCode::BAD_REQUEST, "invalid_email", message),
        InvalidPassword(_) => (StatusCode::BAD_REQUEST, "invalid_password", message),
        InvalidToken(_) | MissingClaims => (StatusCode::UNAUTHORIZED, "invalid_token", message),
        ExpiredToken => (StatusCode::UNAUTHORIZED, "expired_token", message),
        WrongTokenKind { .. } => (StatusCode::BAD_REQUEST, "wrong_token_type", message),
        UserNotFound | CredentialError => (
            StatusCode::NOT_FOUND,
            "user_not_found",
            USER_OR_CREDENTIALS.to_string(),
        ),
        AccountExists => (StatusCode::CONFLICT, "account_exists", message),
        EmailNotVerified => (StatusCode::FORBIDDEN, "email_not_verified", message),
        NotAllowedToSignIn => (StatusCode::FORBIDDEN, "not_allowed_to_sign_in", message),
        RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", message),
        OtpInvalid => (StatusCode::BAD_REQUEST, "otp_invalid", message),
        OtpExpired => (StatusCode::BAD_REQUEST, "otp_expired", message),
        SessionNotFound => (StatusCode::UNAUTHORIZED, "session_not_found", message),
        CsrfMismatch => (StatusCode::FORBIDDEN, "csrf_mismatch", message),
        Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", message),
        Cache(_) | Mail(_) | DbError(_) | Internal(_) => internal(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = self.parts();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error, "request rejected");
        }
        let body = Json(ErrorResponse {
            success: false,
            error: error.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<AccessError> for AppError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::UnknownModule(m) => AppError::NotFound(format!("module '{m}'")),
            other => AppError::Internal(other.to_string()),
        }
    }
}
