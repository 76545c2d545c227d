// @zen-component: AUTH-AccessControl
//
//! Rule-based access control in front of protected route groups.

use axum::extract::{OriginalUri, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use edb_core::access::{Decision, Principal};
use edb_core::auth::AuthError;
use edb_core::models::auth::TokenKind;
use tracing::debug;

use super::auth::bearer_token;
use crate::AppState;
use crate::error::AppError;

/// Resolves the caller to a [`Principal`] and asks the access evaluator.
///
/// No bearer token means anonymous. A token that is present must be a
/// valid access token.
pub async fn rbac(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = match bearer_token(request.headers())? {
        None => Principal::Anonymous,
        Some(token) => {
            let claims = state.tokens.parse(token)?;
            claims.require_kind(TokenKind::Access)?;
            Principal::User {
                id: claims.sub,
                roles: claims.roles,
            }
        }
    };

    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map_or_else(|| request.uri().path(), |uri| uri.0.path())
        .to_string();
    let method = request.method().as_str().to_string();

    match state.access.authorize(&principal, &method, &path) {
        Decision::Allow => {
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Decision::Deny => {
            debug!(%method, %path, "access denied");
            Err(AuthError::Forbidden(format!("{method} {path}")).into())
        }
    }
}
