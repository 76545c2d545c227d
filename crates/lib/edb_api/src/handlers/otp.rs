// @zen-component: AUTH-OtpEndpoint
//
//! Email one-time passcode sign-in.

use axum::body::Bytes;
use axum::extract::State;
use axum_extra::extract::cookie::PrivateCookieJar;
use edb_core::auth::AuthError;
use edb_core::auth::validator::Validator;
use edb_core::mail::{MailItem, MailKind};
use tracing::{debug, info};

use crate::AppState;
use crate::error::AppResult;
use crate::response::{ApiResponse, CsrfTokenResponse};
use crate::services::auth;

/// `POST /sessions/auth/otp/send`: mails a 6-digit code to `email`.
/// Rate limited per address.
pub async fn send(State(state): State<AppState>, body: Bytes) -> AppResult<ApiResponse> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .check_email_is_well_formed()
        .ok()?;
    let address = v.address()?;

    let code = state.otp.generate(&address.address).await?;
    let name = address.name.as_deref().unwrap_or(&address.address);
    state
        .mail
        .send(
            MailItem::new(MailKind::Otp, name, &address.address)
                .with_token(code)
                .with_ttl(state.otp.config().code_ttl),
        )
        .await
        .map_err(AuthError::from)?;

    debug!(to = %address.address, "otp sent");
    Ok(ApiResponse::message("6 digit code sent to email"))
}

/// `POST /sessions/auth/otp/signin`: checks `otp` for `email` and opens a
/// session, creating a verified account on first use.
pub async fn signin(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    body: Bytes,
) -> AppResult<(PrivateCookieJar, ApiResponse<CsrfTokenResponse>)> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .check_email_is_well_formed()
        .ok()?;
    let request = v.body()?;
    let address = v.address()?;

    state.otp.validate(&address.address, &request.otp).await?;

    let name = address.name.as_deref().unwrap_or(&address.address);
    let user = state
        .users
        .create_from_oauth2(name, &address.address)
        .await?;
    let (jar, csrf) = auth::open_session(&state, jar, &user, request.stay_signed_in)?;
    info!(user_id = %user.id, "otp sign-in");
    Ok((jar, ApiResponse::with_message("user has been signed in", csrf)))
}
