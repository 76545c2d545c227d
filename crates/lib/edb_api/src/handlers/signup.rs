// @zen-component: AUTH-RegistrationEndpoint
//
//! Account registration.

use axum::body::Bytes;
use axum::extract::State;
use edb_core::auth::AuthError;
use edb_core::auth::password::check_password;
use edb_core::auth::validator::{Validator, check_username};
use edb_core::mail::{MailItem, MailKind};
use edb_core::models::auth::TokenKind;
use edb_core::users::NewUser;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::response::ApiResponse;

/// `POST /signup`: creates an unverified account and mails a verify-email
/// link. The username defaults to the email address; an empty password
/// creates a passwordless account.
pub async fn signup(State(state): State<AppState>, body: Bytes) -> AppResult<ApiResponse> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .check_email_is_well_formed()
        .ok()?;
    let request = v.body()?;
    let address = v.address()?;

    let username = if request.username.is_empty() {
        address.address.clone()
    } else {
        check_username(&request.username)?;
        request.username.clone()
    };
    if !request.password.is_empty() {
        check_password(&request.password)?;
    }
    let name = if request.name.is_empty() {
        address.name.clone().unwrap_or_else(|| username.clone())
    } else {
        request.name.clone()
    };

    let user = state
        .users
        .create_from_signup(&NewUser {
            username,
            email: address.address.clone(),
            password: request.password.clone(),
            name,
        })
        .await?;

    let token = state
        .tokens
        .verify_email_token(&user, request.redirect_url.as_deref())?;
    state
        .mail
        .send(
            MailItem::new(MailKind::Verify, &user.name, &user.email)
                .with_token(token)
                .with_ttl(state.tokens.ttl(TokenKind::VerifyEmail))
                .with_link(state.config.links.verify_email.as_deref()),
        )
        .await
        .map_err(AuthError::from)?;

    info!(user_id = %user.id, "account created");
    Ok(ApiResponse::message(
        "account created, check your email for a verification link",
    ))
}
