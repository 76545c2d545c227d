//! Session gate.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::PrivateCookieJar;
use edb_core::models::auth::SessionInfo;

use crate::AppState;
use crate::error::AppError;

/// The caller's session, stored in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionInfo);

/// Rejects requests without a valid session cookie.
pub async fn require_session(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = state.sessions.read(&jar)?;
    request.extensions_mut().insert(CurrentSession(session));
    Ok(next.run(request).await)
}
