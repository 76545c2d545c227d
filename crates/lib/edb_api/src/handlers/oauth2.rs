// @zen-component: AUTH-IdentityProviders
//
//! Sign-in with an ID token from an external identity provider.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum_extra::extract::cookie::PrivateCookieJar;
use edb_core::auth::AuthError;
use edb_core::auth::validator::Validator;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::bearer_token;
use crate::response::{ApiResponse, CsrfTokenResponse};
use crate::services::auth;

/// `POST /sessions/auth/oauth2/{provider}/signin`
///
/// The provider's ID token arrives as the bearer token. Once verified the
/// flow is the same for every provider: load or create the account by
/// email, then open a session.
pub async fn signin(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    jar: PrivateCookieJar,
    body: Bytes,
) -> AppResult<(PrivateCookieJar, ApiResponse<CsrfTokenResponse>)> {
    let verifier = state
        .identity
        .get(&provider)
        .ok_or_else(|| AppError::NotFound(format!("identity provider '{provider}'")))?;
    let token = bearer_token(&headers)?
        .ok_or_else(|| AuthError::InvalidToken("missing bearer token".into()))?;

    let stay_signed_in = Validator::new(state.users.as_ref())
        .with_body(&body)
        .parse_login_request_body()
        .success(|v| v.body.is_some_and(|b| b.stay_signed_in))?;

    let identity = verifier.verify(token).await?;
    let user = auth::user_from_identity(&state, &identity).await?;
    let (jar, csrf) = auth::open_session(&state, jar, &user, stay_signed_in)?;
    info!(user_id = %user.id, %provider, "external identity sign-in");
    Ok((jar, ApiResponse::with_message("user has been signed in", csrf)))
}
