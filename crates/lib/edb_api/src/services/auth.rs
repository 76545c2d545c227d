// @zen-component: AUTH-CredentialService
//
//! Flows shared by several routes: emailing tokens, issuing token pairs and
//! opening sessions.

use axum_extra::extract::cookie::PrivateCookieJar;
use edb_core::auth::AuthError;
use edb_core::auth::identity::ExternalIdentity;
use edb_core::auth::roles;
use edb_core::mail::{MailItem, MailKind};
use edb_core::models::auth::{AuthUser, EmailAddress, TokenKind};
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::response::{CsrfTokenResponse, SignInTokens};

pub const PASSWORDLESS_EMAIL_SENT: &str = "check your email for a magic link to sign in";

/// Fails unless the user holds a role that may sign in.
pub fn check_can_sign_in(user: &AuthUser) -> Result<(), AuthError> {
    if roles::can_sign_in(&user.roles) {
        Ok(())
    } else {
        Err(AuthError::NotAllowedToSignIn)
    }
}

/// Mails a passwordless sign-in token. The user must be verified.
pub async fn send_passwordless_email(
    state: &AppState,
    user: &AuthUser,
    redirect_url: Option<&str>,
) -> AppResult<()> {
    if !user.is_email_verified() {
        return Err(AuthError::EmailNotVerified.into());
    }
    let token = state.tokens.passwordless_token(user, redirect_url)?;
    let item = MailItem::new(MailKind::Passwordless, &user.name, &user.email)
        .with_token(token)
        .with_ttl(state.tokens.ttl(TokenKind::Passwordless))
        .with_link(state.config.links.sign_in.as_deref());
    state.mail.send(item).await.map_err(AuthError::from)?;
    info!(user_id = %user.id, "passwordless email queued");
    Ok(())
}

/// Queues a notification with no token attached.
pub async fn notify(state: &AppState, kind: MailKind, user: &AuthUser) -> AppResult<()> {
    state
        .mail
        .send(MailItem::new(kind, &user.name, &user.email))
        .await
        .map_err(AuthError::from)?;
    Ok(())
}

pub fn token_pair(state: &AppState, user: &AuthUser) -> AppResult<SignInTokens> {
    Ok(SignInTokens {
        refresh_token: state.tokens.refresh_token(user)?,
        access_token: state.tokens.access_token(&user.id, &user.roles)?,
    })
}

/// Opens a session for an already authenticated user and issues its CSRF
/// token.
pub fn open_session(
    state: &AppState,
    jar: PrivateCookieJar,
    user: &AuthUser,
    stay_signed_in: bool,
) -> AppResult<(PrivateCookieJar, CsrfTokenResponse)> {
    check_can_sign_in(user)?;
    let (jar, _) = state.sessions.init(jar, user, stay_signed_in)?;
    let (jar, csrf) = state.sessions.issue_csrf(jar);
    info!(user_id = %user.id, stay_signed_in, "session opened");
    Ok((
        jar,
        CsrfTokenResponse {
            csrf_token: csrf.into_string(),
        },
    ))
}

/// Loads or creates the account behind a verified external identity.
pub async fn user_from_identity(
    state: &AppState,
    identity: &ExternalIdentity,
) -> AppResult<AuthUser> {
    let address = EmailAddress::parse(&identity.email)?;
    let name = identity
        .name
        .clone()
        .or_else(|| address.name.clone())
        .unwrap_or_else(|| address.address.clone());
    Ok(state.users.create_from_oauth2(&name, &address.address).await?)
}
