// @zen-component: AUTH-LoginEndpoint
//
//! Username and password sign-in for API clients.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use edb_core::auth::password::check_user_password;
use edb_core::auth::validator::Validator;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::response::ApiResponse;
use crate::services::auth::{self, PASSWORDLESS_EMAIL_SENT};

/// `POST /auth/signin`: returns a refresh and an access token.
///
/// A verified user who sends no password gets a passwordless sign-in
/// email instead.
pub async fn signin(State(state): State<AppState>, body: Bytes) -> AppResult<Response> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .load_auth_user_from_username()
        .await
        .check_user_has_verified_email_address()
        .ok()?;
    let request = v.body()?;
    let user = v.user()?;

    if request.password.is_empty() {
        auth::send_passwordless_email(&state, user, request.redirect_url.as_deref()).await?;
        return Ok(ApiResponse::message(PASSWORDLESS_EMAIL_SENT).into_response());
    }

    check_user_password(&request.password, user.password_hash.as_deref())?;
    auth::check_can_sign_in(user)?;

    let tokens = auth::token_pair(&state, user)?;
    info!(user_id = %user.id, "signed in");
    Ok(ApiResponse::data(tokens).into_response())
}
