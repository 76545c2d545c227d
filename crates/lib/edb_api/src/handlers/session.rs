// @zen-component: AUTH-SessionEndpoint
//
//! Cookie session routes for browser clients.
//!
//! Sign-in routes open a session and answer with a CSRF token; state
//! changing routes behind the session require that token in the
//! `X-CSRF-Token` header.

use axum::Extension;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::PrivateCookieJar;
use edb_core::auth::AuthError;
use edb_core::auth::password::{check_password, check_user_password};
use edb_core::auth::validator::Validator;
use edb_core::mail::MailKind;
use edb_core::models::auth::{AuthUser, SessionInfo, TokenKind};
use serde::Deserialize;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::handlers::users::update_user_info;
use crate::middleware::auth::AuthenticatedClaims;
use crate::middleware::session::CurrentSession;
use crate::response::{ApiResponse, CsrfTokenResponse, TokenResponse};
use crate::services::auth::{self, PASSWORDLESS_EMAIL_SENT};

const SIGNED_IN: &str = "user has been signed in";

/// `POST /sessions/auth/signin`: username and password sign-in.
///
/// As with `/auth/signin`, an empty password sends a passwordless email
/// and opens no session.
pub async fn signin(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    body: Bytes,
) -> AppResult<Response> {
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
    let (jar, csrf) = auth::open_session(&state, jar, user, request.stay_signed_in)?;
    Ok((jar, ApiResponse::with_message(SIGNED_IN, csrf)).into_response())
}

/// `POST /sessions/api/keys/signin`: opens a browser-session cookie for
/// the owner of `apiKey`.
pub async fn api_key_signin(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    body: Bytes,
) -> AppResult<(PrivateCookieJar, ApiResponse<CsrfTokenResponse>)> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .parse_login_request_body()
        .ok()?;
    let api_key = &v.body()?.api_key;
    if api_key.is_empty() {
        return Err(AuthError::MalformedRequest("apiKey is required".into()).into());
    }

    let user = state.users.find_by_api_key(api_key).await?;
    let (jar, csrf) = auth::open_session(&state, jar, &user, false)?;
    Ok((jar, ApiResponse::with_message(SIGNED_IN, csrf)))
}

/// `POST /sessions/auth/passwordless/validate`: opens a durable session
/// from a passwordless token.
pub async fn passwordless_validate(
    State(state): State<AppState>,
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
    jar: PrivateCookieJar,
) -> AppResult<(PrivateCookieJar, ApiResponse<CsrfTokenResponse>)> {
    let v = Validator::new(state.users.as_ref())
        .with_claims(Some(claims))
        .check_token_kind(TokenKind::Passwordless)
        .load_auth_user_from_token()
        .await
        .check_user_has_verified_email_address()
        .ok()?;
    let (jar, csrf) = auth::open_session(&state, jar, v.user()?, true)?;
    Ok((jar, ApiResponse::with_message(SIGNED_IN, csrf)))
}

/// `GET /sessions/info`
pub async fn info(
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> ApiResponse<SessionInfo> {
    ApiResponse::data(session)
}

/// `POST /sessions/csrf-token/refresh`: issues a new CSRF token. The
/// session cookie is untouched.
pub async fn refresh_csrf_token(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, ApiResponse<CsrfTokenResponse>) {
    let (jar, csrf) = state.sessions.issue_csrf(jar);
    (
        jar,
        ApiResponse::data(CsrfTokenResponse {
            csrf_token: csrf.into_string(),
        }),
    )
}

/// `POST /sessions/refresh`: reloads the user snapshot from the store.
pub async fn refresh(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    jar: PrivateCookieJar,
) -> AppResult<(PrivateCookieJar, ApiResponse<SessionInfo>)> {
    let user = state.users.find_by_id(&session.user.id).await?;
    auth::check_can_sign_in(&user)?;
    let (jar, session) = state.sessions.refresh(jar, &session, user)?;
    Ok((jar, ApiResponse::with_message("session refreshed", session)))
}

/// `POST /sessions/signout`: expires the session and CSRF cookies.
pub async fn signout(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, ApiResponse) {
    let jar = state.sessions.clear(jar);
    info!(user_id = %session.user.id, "signed out");
    (jar, ApiResponse::message("user has been signed out"))
}

/// `POST /sessions/tokens/create/{type}`: mints an `access` or `update`
/// token for the session user.
///
/// The user is reloaded first so the token carries current roles, and the
/// refreshed snapshot is written back to the session.
pub async fn create_token(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    jar: PrivateCookieJar,
    Path(kind): Path<String>,
) -> AppResult<(PrivateCookieJar, ApiResponse<TokenResponse>)> {
    let kind = kind.parse::<TokenKind>()?;
    if !matches!(kind, TokenKind::Access | TokenKind::Update) {
        return Err(AuthError::MalformedRequest(format!(
            "cannot create {kind} tokens from a session"
        ))
        .into());
    }

    let user = state.users.find_by_id(&session.user.id).await?;
    auth::check_can_sign_in(&user)?;
    let (jar, session) = state.sessions.refresh(jar, &session, user)?;

    let user = &session.user;
    let token = match kind {
        TokenKind::Update => state.tokens.update_token(&user.id, &user.roles)?,
        _ => state.tokens.access_token(&user.id, &user.roles)?,
    };
    Ok((jar, ApiResponse::data(TokenResponse { token })))
}

/// `GET /sessions/user`
pub async fn user(
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> ApiResponse<AuthUser> {
    ApiResponse::data(session.user)
}

/// `POST /sessions/user/update`: changes username and display name and
/// re-embeds the updated user in the session.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    jar: PrivateCookieJar,
    body: Bytes,
) -> AppResult<(PrivateCookieJar, ApiResponse<AuthUser>)> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .parse_login_request_body()
        .ok()?;
    let request = v.body()?;
    let user = update_user_info(&state, &session.user, &request.username, &request.name).await?;
    let (jar, session) = state.sessions.refresh(jar, &session, user)?;
    Ok((jar, ApiResponse::with_message("account updated", session.user)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordUpdateRequest {
    pub password: String,
    pub new_password: String,
}

/// `POST /sessions/user/passwords/update`
///
/// `password` must match the current password unless the account is
/// passwordless. An empty `newPassword` makes the account passwordless.
pub async fn update_password(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    body: Bytes,
) -> AppResult<ApiResponse> {
    let request: PasswordUpdateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        PasswordUpdateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AuthError::MalformedRequest(e.to_string()))?
    };

    let user = state.users.find_by_id(&session.user.id).await?;
    if user.password_hash.is_some() {
        check_user_password(&request.password, user.password_hash.as_deref()).map_err(
            |e| match e {
                AuthError::CredentialError => {
                    AuthError::InvalidPassword("current password does not match".into())
                }
                other => other,
            },
        )?;
    }
    if !request.new_password.is_empty() {
        check_password(&request.new_password)?;
    }

    let user = state
        .users
        .set_password(&user.id, &request.new_password)
        .await?;
    auth::notify(&state, MailKind::PasswordUpdated, &user).await?;
    info!(user_id = %user.id, "password updated");
    Ok(ApiResponse::message("password updated successfully"))
}
