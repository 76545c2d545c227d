//! Success envelope: `{"success": true, "message": text, "data": value}`.

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize = ()> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl ApiResponse<()> {
    /// A message with no data.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self::with_message("", data)
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `data` of session sign-in and CSRF refresh responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInTokens {
    pub refresh_token: String,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub users: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_only_has_null_data() {
        let json = serde_json::to_value(ApiResponse::message("done")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": true, "message": "done", "data": null})
        );
    }

    #[test]
    fn data_fields_are_camel_case() {
        let json = serde_json::to_value(ApiResponse::data(CsrfTokenResponse {
            csrf_token: "abc".into(),
        }))
        .unwrap();
        assert_eq!(json["data"]["csrfToken"], "abc");
    }
}
