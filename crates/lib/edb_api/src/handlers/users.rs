//! Account details for bearer-token clients.

use axum::Extension;
use axum::body::Bytes;
use axum::extract::State;
use edb_core::auth::AuthError;
use edb_core::auth::validator::{Validator, check_username};
use edb_core::mail::MailKind;
use edb_core::models::auth::AuthUser;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedClaims;
use crate::response::ApiResponse;
use crate::services::auth;

/// `POST /auth/users`: the token subject's account.
pub async fn user(
    State(state): State<AppState>,
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
) -> AppResult<ApiResponse<AuthUser>> {
    let user = Validator::new(state.users.as_ref())
        .with_claims(Some(claims))
        .load_auth_user_from_token()
        .await
        .success(|v| v.user)?
        .ok_or(AuthError::UserNotFound)?;
    Ok(ApiResponse::data(user))
}

/// `POST /auth/users/update`: changes username and display name. Empty
/// fields keep their current value.
pub async fn update(
    State(state): State<AppState>,
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
    body: Bytes,
) -> AppResult<ApiResponse<AuthUser>> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .with_claims(Some(claims))
        .parse_login_request_body()
        .load_auth_user_from_token()
        .await
        .ok()?;
    let user = update_user_info(&state, v.user()?, &v.body()?.username, &v.body()?.name).await?;
    Ok(ApiResponse::with_message("account updated", user))
}

/// Shared by the bearer and session variants of the update route.
pub(crate) async fn update_user_info(
    state: &AppState,
    user: &AuthUser,
    username: &str,
    name: &str,
) -> AppResult<AuthUser> {
    let username = if username.is_empty() {
        user.username.as_str()
    } else {
        check_username(username)?;
        username
    };
    let name = if name.is_empty() { user.name.as_str() } else { name };

    let user = state.users.set_user_info(&user.id, username, name).await?;
    auth::notify(state, MailKind::AccountUpdated, &user).await?;
    info!(user_id = %user.id, "account updated");
    Ok(user)
}
