//! Service description.

use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::response::ApiResponse;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    pub name: &'static str,
    pub version: &'static str,
    pub identity_providers: Vec<String>,
}

/// `GET /about`
pub async fn about(State(state): State<AppState>) -> ApiResponse<About> {
    ApiResponse::data(About {
        name: env!("CARGO_PKG_NAME"),
        version: edb_core::version(),
        identity_providers: state
            .identity
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}
