// @zen-component: AUTH-PasswordlessEndpoint
//
//! Magic-link sign-in.

use axum::Extension;
use axum::body::Bytes;
use axum::extract::State;
use edb_core::auth::validator::Validator;
use edb_core::models::auth::TokenKind;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedClaims;
use crate::response::{ApiResponse, RefreshTokenResponse};
use crate::services::auth::{self, PASSWORDLESS_EMAIL_SENT};

/// `POST /auth/passwordless/email`
pub async fn send_email(State(state): State<AppState>, body: Bytes) -> AppResult<ApiResponse> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .load_auth_user_from_username()
        .await
        .ok()?;
    auth::send_passwordless_email(&state, v.user()?, v.body()?.redirect_url.as_deref()).await?;
    Ok(ApiResponse::message(PASSWORDLESS_EMAIL_SENT))
}

/// `POST /auth/passwordless/signin`: trades a passwordless token for a
/// refresh token.
pub async fn signin(
    State(state): State<AppState>,
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
) -> AppResult<ApiResponse<RefreshTokenResponse>> {
    let v = Validator::new(state.users.as_ref())
        .with_claims(Some(claims))
        .check_token_kind(TokenKind::Passwordless)
        .load_auth_user_from_token()
        .await
        .check_user_has_verified_email_address()
        .check_user_can_sign_in()
        .ok()?;
    let user = v.user()?;

    let refresh_token = state.tokens.refresh_token(user)?;
    info!(user_id = %user.id, "passwordless sign-in");
    Ok(ApiResponse::data(RefreshTokenResponse { refresh_token }))
}
