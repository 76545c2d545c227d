//! CSRF check for state-changing session routes.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::PrivateCookieJar;
use edb_core::auth::csrf::{self, CSRF_HEADER};
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// The `X-CSRF-Token` header must match the token in the CSRF cookie.
pub async fn require_csrf(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.sessions.csrf_token(&jar);
    let submitted = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = csrf::validate(expected.as_deref(), submitted) {
        debug!(
            path = %request.uri().path(),
            has_cookie = expected.is_some(),
            has_header = submitted.is_some(),
            "csrf check failed"
        );
        return Err(e.into());
    }
    Ok(next.run(request).await)
}
