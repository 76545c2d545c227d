// @zen-component: AUTH-AdminEndpoint
//
//! Administrative introspection and account management. Every route here
//! sits behind the access rules, which admit admins only by default.

use axum::body::Bytes;
use axum::extract::{Path, State};
use edb_core::auth::AuthError;
use edb_core::auth::password::check_password;
use edb_core::auth::validator::Validator;
use edb_core::mail::{MailItem, MailKind};
use edb_core::models::auth::AuthUser;
use edb_core::users::NewUser;
use serde::Deserialize;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::response::{ApiResponse, UserStats};

pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const MAX_PAGE_SIZE: u64 = 1000;

/// `GET /admin/roles`: every role the access rules know about.
pub async fn roles(State(state): State<AppState>) -> ApiResponse<Vec<String>> {
    ApiResponse::data(state.access.roles())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserListRequest {
    pub offset: u64,
    /// Page size. Zero means [`DEFAULT_PAGE_SIZE`].
    pub records: u64,
}

/// `POST /admin/users`: a page of accounts, oldest first.
pub async fn users(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<ApiResponse<Vec<AuthUser>>> {
    let request: UserListRequest = if body.iter().all(u8::is_ascii_whitespace) {
        UserListRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AuthError::MalformedRequest(e.to_string()))?
    };
    let records = match request.records {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    };
    let users = state.users.users(request.offset, records).await?;
    Ok(ApiResponse::data(users))
}

/// `GET /admin/users/stats`
pub async fn user_stats(State(state): State<AppState>) -> AppResult<ApiResponse<UserStats>> {
    let users = state.users.count().await?;
    Ok(ApiResponse::data(UserStats { users }))
}

/// `POST /admin/users/add`: creates an account and tells its owner.
///
/// The address counts as verified only when `emailIsVerified` is set.
/// `roles`, when given, replace the default roles.
pub async fn add_user(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<ApiResponse<AuthUser>> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .check_username_is_well_formed()
        .check_email_is_well_formed()
        .ok()?;
    let request = v.body()?;
    let address = v.address()?;
    if !request.password.is_empty() {
        check_password(&request.password)?;
    }

    let name = if request.name.is_empty() {
        request.username.clone()
    } else {
        request.name.clone()
    };
    let mut user = state
        .users
        .create_from_signup(&NewUser {
            username: request.username.clone(),
            email: address.address.clone(),
            password: request.password.clone(),
            name,
        })
        .await?;
    if request.email_is_verified {
        user = state.users.set_email_verified(&user.id).await?;
    }
    if !request.roles.is_empty() {
        user = state.users.set_roles(&user.id, &request.roles).await?;
    }

    state
        .mail
        .send(
            MailItem::new(MailKind::AccountCreated, &user.name, &user.email)
                .with_link(state.config.links.sign_in.as_deref()),
        )
        .await
        .map_err(AuthError::from)?;

    info!(user_id = %user.id, "account added by admin");
    Ok(ApiResponse::with_message("user created", user))
}

/// `POST /admin/users/update`: rewrites the account named by `publicId`.
///
/// Username, name and email are always set. The password changes only if
/// one is given and the roles only if the list is non-empty, so an update
/// cannot leave an account without roles.
pub async fn update_user(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<ApiResponse<AuthUser>> {
    let v = Validator::new(state.users.as_ref())
        .with_body(&body)
        .check_username_is_well_formed()
        .check_email_is_well_formed()
        .load_auth_user_from_public_id()
        .await
        .ok()?;
    let request = v.body()?;
    let address = v.address()?;
    let user = v.user()?;
    if !request.password.is_empty() {
        check_password(&request.password)?;
    }

    let name = if request.name.is_empty() {
        user.name.as_str()
    } else {
        request.name.as_str()
    };
    let mut updated = state
        .users
        .set_user_info(&user.id, &request.username, name)
        .await?;
    if !updated.email.eq_ignore_ascii_case(&address.address) {
        updated = state.users.set_email(&user.id, &address.address).await?;
    }
    if !request.password.is_empty() {
        updated = state.users.set_password(&user.id, &request.password).await?;
    }
    if !request.roles.is_empty() {
        updated = state.users.set_roles(&user.id, &request.roles).await?;
    }

    info!(user_id = %updated.id, "account updated by admin");
    Ok(ApiResponse::with_message("user updated", updated))
}

/// `DELETE /admin/users/delete/{id}`: `id` is the public id.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<ApiResponse> {
    state.users.delete_by_public_id(&public_id).await?;
    info!(public_id = %public_id, "account deleted by admin");
    Ok(ApiResponse::message("user deleted"))
}
