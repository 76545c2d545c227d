// @zen-component: AUTH-TokenRefreshEndpoint
//
//! Token introspection and exchange.

use axum::Extension;
use axum::extract::State;
use chrono::{DateTime, SecondsFormat};
use edb_core::auth::AuthError;
use edb_core::auth::validator::Validator;
use serde::Serialize;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedClaims;
use crate::response::{AccessTokenResponse, ApiResponse};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub roles: Vec<String>,
    pub issued_at: String,
    pub expires: String,
}

fn rfc3339(timestamp: i64) -> Result<String, AuthError> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| AuthError::InvalidToken(format!("timestamp {timestamp} out of range")))
}

/// `POST /auth/tokens/info`: describes the bearer token.
pub async fn info(
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
) -> AppResult<ApiResponse<TokenInfo>> {
    Ok(ApiResponse::data(TokenInfo {
        issued_at: rfc3339(claims.iat)?,
        expires: rfc3339(claims.exp)?,
        user_id: claims.sub,
        kind: claims.kind.to_string(),
        roles: claims.roles,
    }))
}

/// `POST /auth/tokens/access`: exchanges a refresh token for an access
/// token carrying the account's current roles.
pub async fn access(
    State(state): State<AppState>,
    Extension(AuthenticatedClaims(claims)): Extension<AuthenticatedClaims>,
) -> AppResult<ApiResponse<AccessTokenResponse>> {
    let token = Validator::new(state.users.as_ref())
        .with_claims(Some(claims))
        .check_is_valid_refresh_token()
        .load_auth_user_from_token()
        .await
        .check_user_can_sign_in()
        .success(|v| {
            let user = v.user()?;
            state.tokens.access_token(&user.id, &user.roles)
        })??;
    Ok(ApiResponse::data(AccessTokenResponse {
        access_token: token,
    }))
}
