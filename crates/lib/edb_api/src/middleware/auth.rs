// @zen-component: AUTH-BearerToken
//
//! Bearer token extraction and verification.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use edb_core::auth::AuthError;
use edb_core::models::auth::{TokenClaims, TokenKind};

use crate::AppState;
use crate::error::AppError;

/// Verified claims, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedClaims(pub TokenClaims);

/// The raw token from `Authorization: Bearer <token>`, if any.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidToken("authorization header is not ASCII".into()))?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidToken("expected a bearer token".into()))?;
    Ok(Some(token))
}

/// Verifies the bearer token and injects [`AuthenticatedClaims`]. Any kind
/// is accepted; handlers or the kind gates below check it.
pub async fn require_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?
        .ok_or_else(|| AuthError::InvalidToken("missing bearer token".into()))?;
    let claims = state.tokens.parse(token)?;
    request.extensions_mut().insert(AuthenticatedClaims(claims));
    Ok(next.run(request).await)
}

fn require_kind(kind: TokenKind, request: &Request) -> Result<(), AppError> {
    let AuthenticatedClaims(claims) = request
        .extensions()
        .get::<AuthenticatedClaims>()
        .ok_or(AuthError::MissingClaims)?;
    claims.require_kind(kind)?;
    Ok(())
}

/// Must run after [`require_token`].
pub async fn require_access_token(request: Request, next: Next) -> Result<Response, AppError> {
    require_kind(TokenKind::Access, &request)?;
    Ok(next.run(request).await)
}

pub async fn require_update_token(request: Request, next: Next) -> Result<Response, AppError> {
    require_kind(TokenKind::Update, &request)?;
    Ok(next.run(request).await)
}

pub async fn require_verify_email_token(
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_kind(TokenKind::VerifyEmail, &request)?;
    Ok(next.run(request).await)
}
