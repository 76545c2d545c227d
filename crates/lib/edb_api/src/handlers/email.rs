// @zen-component: AUTH-EmailEndpoint
//
//! Email verification and address changes.

use axum::Extension;
use axum::body::Bytes;
use axum::extract::State;
use edb_core::auth::AuthError;
use edb_core::auth::tokens::check_one_time_passcode;
use edb_core::auth::validator::Validator;
use edb_core::mail::{MailItem, MailKind};
use edb_core::models::auth::{EmailAddress, TokenKind};
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedClaims;
use crate::response::ApiResponse;
use crate::services::auth;

/// `POST /auth/email/verified`: marks the token subject's address as
/// verified. Repeating it is a successful no-op.
pub async fn verified(
    State(state): State<AppState>,
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
) -> AppResult<ApiResponse> {
    let v = Validator::new(state.users.as_ref())
        .with_claims(Some(claims))
        .load_auth_user_from_token()
        .await
        .ok()?;
    let user = v.user()?;

    if user.is_email_verified() {
        return Ok(ApiResponse::message("email address already verified"));
    }

    let user = state.users.set_email_verified(&user.id).await?;
    auth::notify(&state, MailKind::Verified, &user).await?;
    info!(user_id = %user.id, "email verified");
    Ok(ApiResponse::message("email address verified"))
}

/// `POST /auth/email/reset`: mails a change-email link for the address in
/// the body to the account's current address.
pub async fn send_reset_email(
    State(state): State<AppState>,
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
    body: Bytes,
) -> AppResult<ApiResponse> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .with_claims(Some(claims))
        .check_email_is_well_formed()
        .load_auth_user_from_token()
        .await
        .check_user_has_verified_email_address()
        .ok()?;
    let user = v.user()?;
    let new_email = &v.address()?.address;

    match state.users.find_by_email(new_email).await {
        Ok(_) => return Err(AuthError::AccountExists.into()),
        Err(AuthError::UserNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let token = state.tokens.change_email_token(user, new_email)?;
    state
        .mail
        .send(
            MailItem::new(MailKind::EmailReset, &user.name, &user.email)
                .with_token(token)
                .with_ttl(state.tokens.ttl(TokenKind::ChangeEmail))
                .with_link(state.config.links.reset_email.as_deref()),
        )
        .await
        .map_err(AuthError::from)?;

    Ok(ApiResponse::message(
        "check your email for a change email link",
    ))
}

/// `POST /auth/email/update`: applies a change-email token.
///
/// The new address comes from the token. A body `email`, if sent, must
/// name the same address.
pub async fn update(
    State(state): State<AppState>,
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
    body: Bytes,
) -> AppResult<ApiResponse> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .with_claims(Some(claims))
        .parse_login_request_body()
        .check_token_kind(TokenKind::ChangeEmail)
        .load_auth_user_from_token()
        .await
        .ok()?;
    let claims = v.claims()?;
    let user = v.user()?;
    check_one_time_passcode(user, claims)?;

    let new_email = claims
        .email
        .as_deref()
        .ok_or_else(|| AuthError::InvalidToken("token carries no email address".into()))?;
    let requested = &v.body()?.email;
    if !requested.is_empty() && EmailAddress::parse(requested)?.address != new_email {
        return Err(AuthError::InvalidEmail("does not match the requested change".into()).into());
    }

    let user = state.users.set_email(&user.id, new_email).await?;
    auth::notify(&state, MailKind::EmailUpdated, &user).await?;
    info!(user_id = %user.id, "email updated");
    Ok(ApiResponse::message("email updated confirmation email sent"))
}
