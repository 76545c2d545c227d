// @zen-component: AUTH-PasswordEndpoint
//
//! Password reset by email.

use axum::Extension;
use axum::body::Bytes;
use axum::extract::State;
use edb_core::auth::AuthError;
use edb_core::auth::password::check_password;
use edb_core::auth::tokens::check_one_time_passcode;
use edb_core::auth::validator::Validator;
use edb_core::mail::{MailItem, MailKind};
use edb_core::models::auth::TokenKind;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedClaims;
use crate::response::ApiResponse;
use crate::services::auth;

/// `POST /auth/passwords/reset`: mails a reset-password link.
pub async fn send_reset_email(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<ApiResponse> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .load_auth_user_from_email()
        .await
        .check_user_has_verified_email_address()
        .ok()?;
    let user = v.user()?;

    let token = state.tokens.reset_password_token(user)?;
    state
        .mail
        .send(
            MailItem::new(MailKind::PasswordReset, &user.name, &user.email)
                .with_token(token)
                .with_ttl(state.tokens.ttl(TokenKind::ResetPassword))
                .with_link(state.config.links.reset_password.as_deref()),
        )
        .await
        .map_err(AuthError::from)?;

    Ok(ApiResponse::message(
        "check your email for a password reset link",
    ))
}

/// `POST /auth/passwords/update`: sets a new password with a
/// reset-password token. The token stops working once it has been used.
pub async fn update(
    State(state): State<AppState>,
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
    body: Bytes,
) -> AppResult<ApiResponse> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .with_claims(Some(claims))
        .parse_login_request_body()
        .check_token_kind(TokenKind::ResetPassword)
        .load_auth_user_from_token()
        .await
        .ok()?;
    let user = v.user()?;
    check_one_time_passcode(user, v.claims()?)?;

    let password = &v.body()?.password;
    check_password(password)?;

    let user = state.users.set_password(&user.id, password).await?;
    auth::notify(&state, MailKind::PasswordUpdated, &user).await?;
    info!(user_id = %user.id, "password reset");
    Ok(ApiResponse::message("password updated confirmation email sent"))
}
