// @zen-component: AUTH-UserStore
//
//! User record storage.
//!
//! Lookups that find nothing fail with [`AuthError::UserNotFound`].

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::auth::AuthError;
use crate::models::auth::AuthUser;

pub use memory::MemoryUserStore;
pub use postgres::{PgUserStore, migrate};

/// Input to [`UserStore::create_from_signup`]. `password` is plaintext;
/// an empty password creates a passwordless account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<AuthUser, AuthError>;

    async fn find_by_public_id(&self, public_id: &str) -> Result<AuthUser, AuthError>;

    async fn find_by_username(&self, username: &str) -> Result<AuthUser, AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<AuthUser, AuthError>;

    async fn find_by_api_key(&self, api_key: &str) -> Result<AuthUser, AuthError>;

    /// Creates an unverified account. Fails with [`AuthError::AccountExists`]
    /// if the username or email is taken.
    async fn create_from_signup(&self, user: &NewUser) -> Result<AuthUser, AuthError>;

    /// Loads the account for `email`, creating a verified passwordless one
    /// if none exists. Used after OTP and external identity sign-in, where
    /// control of the address has already been proven.
    async fn create_from_oauth2(&self, name: &str, email: &str) -> Result<AuthUser, AuthError>;

    async fn set_email_verified(&self, id: &str) -> Result<AuthUser, AuthError>;

    /// Hashes and stores `password`. An empty password makes the account
    /// passwordless.
    async fn set_password(&self, id: &str, password: &str) -> Result<AuthUser, AuthError>;

    async fn set_email(&self, id: &str, email: &str) -> Result<AuthUser, AuthError>;

    async fn set_user_info(
        &self,
        id: &str,
        username: &str,
        name: &str,
    ) -> Result<AuthUser, AuthError>;

    async fn set_roles(&self, id: &str, roles: &[String]) -> Result<AuthUser, AuthError>;

    /// A page of accounts, oldest first.
    async fn users(&self, offset: u64, records: u64) -> Result<Vec<AuthUser>, AuthError>;

    async fn count(&self) -> Result<u64, AuthError>;

    /// Removes the account and its API keys.
    async fn delete_by_public_id(&self, public_id: &str) -> Result<(), AuthError>;
}

/// User ids are UUIDv7 so rows sort by creation time.
pub(crate) fn new_user_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Public IDs are short, URL-safe and not derived from the primary key.
pub(crate) fn new_public_id() -> String {
    use rand::Rng;
    use rand::distr::Alphanumeric;

    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}
