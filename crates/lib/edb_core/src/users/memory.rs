//! In-memory user store for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use super::{NewUser, UserStore, new_public_id, new_user_id};
use crate::auth::AuthError;
use crate::auth::password::hash_password;
use crate::auth::roles::default_roles;
use crate::models::auth::{AuthUser, EMAIL_NOT_VERIFIED};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, AuthUser>,
    /// API key → user id.
    api_keys: HashMap<String, String>,
}

impl Inner {
    fn find(&self, pred: impl Fn(&AuthUser) -> bool) -> Result<AuthUser, AuthError> {
        self.users
            .values()
            .find(|&u| pred(u))
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    fn taken(&self, username: &str, email: &str) -> bool {
        self.users.values().any(|u| {
            u.username.eq_ignore_ascii_case(username) || u.email.eq_ignore_ascii_case(email)
        })
    }

    fn update(
        &mut self,
        id: &str,
        f: impl FnOnce(&mut AuthUser),
    ) -> Result<AuthUser, AuthError> {
        let user = self.users.get_mut(id).ok_or(AuthError::UserNotFound)?;
        f(user);
        user.updated_at = Utc::now().timestamp();
        Ok(user.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed account, replacing any with the same id.
    pub async fn insert(&self, user: AuthUser) {
        self.inner.write().await.users.insert(user.id.clone(), user);
    }

    pub async fn add_api_key(&self, api_key: &str, user_id: &str) -> Result<(), AuthError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(user_id) {
            return Err(AuthError::UserNotFound);
        }
        inner
            .api_keys
            .insert(api_key.to_string(), user_id.to_string());
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<AuthUser, AuthError> {
        self.inner
            .read()
            .await
            .users
            .get(id)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn find_by_public_id(&self, public_id: &str) -> Result<AuthUser, AuthError> {
        self.inner.read().await.find(|u| u.public_id == public_id)
    }

    async fn find_by_username(&self, username: &str) -> Result<AuthUser, AuthError> {
        self.inner
            .read()
            .await
            .find(|u| u.username.eq_ignore_ascii_case(username))
    }

    async fn find_by_email(&self, email: &str) -> Result<AuthUser, AuthError> {
        self.inner
            .read()
            .await
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<AuthUser, AuthError> {
        let inner = self.inner.read().await;
        let id = inner.api_keys.get(api_key).ok_or(AuthError::UserNotFound)?;
        inner.users.get(id).cloned().ok_or(AuthError::UserNotFound)
    }

    async fn create_from_signup(&self, new: &NewUser) -> Result<AuthUser, AuthError> {
        let password_hash = if new.password.is_empty() {
            None
        } else {
            Some(hash_password(&new.password)?)
        };

        let mut inner = self.inner.write().await;
        if inner.taken(&new.username, &new.email) {
            return Err(AuthError::AccountExists);
        }

        let user = AuthUser {
            id: new_user_id(),
            public_id: new_public_id(),
            username: new.username.clone(),
            email: new.email.to_lowercase(),
            password_hash,
            email_verified_at: EMAIL_NOT_VERIFIED,
            roles: default_roles(),
            name: new.name.clone(),
            updated_at: Utc::now().timestamp(),
        };
        inner.users.insert(user.id.clone(), user.clone());
        info!(user_id = %user.id, "created user from signup");
        Ok(user)
    }

    async fn create_from_oauth2(&self, name: &str, email: &str) -> Result<AuthUser, AuthError> {
        let mut inner = self.inner.write().await;
        if let Ok(existing) = inner.find(|u| u.email.eq_ignore_ascii_case(email)) {
            return Ok(existing);
        }

        let now = Utc::now().timestamp();
        let email = email.to_lowercase();
        let user = AuthUser {
            id: new_user_id(),
            public_id: new_public_id(),
            username: email.clone(),
            email,
            password_hash: None,
            email_verified_at: now,
            roles: default_roles(),
            name: name.to_string(),
            updated_at: now,
        };
        inner.users.insert(user.id.clone(), user.clone());
        info!(user_id = %user.id, "created user from external identity");
        Ok(user)
    }

    async fn set_email_verified(&self, id: &str) -> Result<AuthUser, AuthError> {
        let now = Utc::now().timestamp();
        self.inner
            .write()
            .await
            .update(id, |u| u.email_verified_at = now)
    }

    async fn set_password(&self, id: &str, password: &str) -> Result<AuthUser, AuthError> {
        let hash = if password.is_empty() {
            None
        } else {
            Some(hash_password(password)?)
        };
        self.inner
            .write()
            .await
            .update(id, |u| u.password_hash = hash)
    }

    async fn set_email(&self, id: &str, email: &str) -> Result<AuthUser, AuthError> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .users
            .values()
            .any(|u| u.id != id && u.email.eq_ignore_ascii_case(email));
        if taken {
            return Err(AuthError::AccountExists);
        }
        let email = email.to_lowercase();
        inner.update(id, |u| u.email = email)
    }

    async fn set_user_info(
        &self,
        id: &str,
        username: &str,
        name: &str,
    ) -> Result<AuthUser, AuthError> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .users
            .values()
            .any(|u| u.id != id && u.username.eq_ignore_ascii_case(username));
        if taken {
            return Err(AuthError::AccountExists);
        }
        inner.update(id, |u| {
            u.username = username.to_string();
            u.name = name.to_string();
        })
    }

    async fn set_roles(&self, id: &str, roles: &[String]) -> Result<AuthUser, AuthError> {
        let roles = roles.to_vec();
        self.inner.write().await.update(id, |u| u.roles = roles)
    }

    async fn users(&self, offset: u64, records: u64) -> Result<Vec<AuthUser>, AuthError> {
        let inner = self.inner.read().await;
        let mut users: Vec<&AuthUser> = inner.users.values().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(records).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, AuthError> {
        Ok(self.inner.read().await.users.len() as u64)
    }

    async fn delete_by_public_id(&self, public_id: &str) -> Result<(), AuthError> {
        let mut inner = self.inner.write().await;
        let id = inner.find(|u| u.public_id == public_id)?.id;
        inner.users.remove(&id);
        inner.api_keys.retain(|_, owner| *owner != id);
        info!(user_id = %id, "deleted user");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;

    fn signup(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password: "password123".into(),
            name: "Test".into(),
        }
    }

    #[tokio::test]
    async fn signup_creates_unverified_user_with_hashed_password() {
        let store = MemoryUserStore::new();
        let user = store
            .create_from_signup(&signup("alice", "Alice@Example.com"))
            .await
            .unwrap();
        assert!(!user.is_email_verified());
        assert_eq!(user.email, "alice@example.com");
        let hash = user.password_hash.as_deref().unwrap();
        assert!(verify_password("password123", hash).unwrap());
        assert_eq!(store.find_by_username("ALICE").await.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_rejected() {
        let store = MemoryUserStore::new();
        store
            .create_from_signup(&signup("alice", "alice@example.com"))
            .await
            .unwrap();
        assert!(matches!(
            store
                .create_from_signup(&signup("alice", "other@example.com"))
                .await,
            Err(AuthError::AccountExists)
        ));
        assert!(matches!(
            store
                .create_from_signup(&signup("bob", "alice@example.com"))
                .await,
            Err(AuthError::AccountExists)
        ));
    }

    #[tokio::test]
    async fn oauth2_create_is_idempotent_per_email() {
        let store = MemoryUserStore::new();
        let first = store
            .create_from_oauth2("Bob", "bob@example.com")
            .await
            .unwrap();
        assert!(first.is_email_verified());
        assert!(first.password_hash.is_none());
        let second = store
            .create_from_oauth2("Robert", "BOB@example.com")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn missing_users_are_not_found() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.find_by_id("nope").await,
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            store.find_by_api_key("key").await,
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            store.set_password("nope", "password123").await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn api_keys_resolve_to_their_user() {
        let store = MemoryUserStore::new();
        let user = store
            .create_from_signup(&signup("carol", "carol@example.com"))
            .await
            .unwrap();
        store.add_api_key("k-123", &user.id).await.unwrap();
        assert_eq!(store.find_by_api_key("k-123").await.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn set_email_rejects_addresses_in_use() {
        let store = MemoryUserStore::new();
        let a = store
            .create_from_signup(&signup("a1", "a@example.com"))
            .await
            .unwrap();
        store
            .create_from_signup(&signup("b1", "b@example.com"))
            .await
            .unwrap();
        assert!(matches!(
            store.set_email(&a.id, "b@example.com").await,
            Err(AuthError::AccountExists)
        ));
        let updated = store.set_email(&a.id, "new@example.com").await.unwrap();
        assert_eq!(updated.email, "new@example.com");
    }

    #[tokio::test]
    async fn pages_through_users_oldest_first() {
        let store = MemoryUserStore::new();
        let mut created = Vec::new();
        for name in ["ann", "ben", "cat"] {
            created.push(
                store
                    .create_from_signup(&signup(name, &format!("{name}@example.com")))
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(store.count().await.unwrap(), 3);

        let page = store.users(1, 5).await.unwrap();
        let names: Vec<&str> = page.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, ["ben", "cat"]);
        assert!(store.users(3, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_roles_replaces_the_role_set() {
        let store = MemoryUserStore::new();
        let user = store
            .create_from_signup(&signup("dan", "dan@example.com"))
            .await
            .unwrap();
        let updated = store
            .set_roles(&user.id, &["admin".to_string()])
            .await
            .unwrap();
        assert_eq!(updated.roles, ["admin"]);
    }

    #[tokio::test]
    async fn delete_removes_the_user_and_its_api_keys() {
        let store = MemoryUserStore::new();
        let user = store
            .create_from_signup(&signup("eve", "eve@example.com"))
            .await
            .unwrap();
        store.add_api_key("k-eve", &user.id).await.unwrap();

        store.delete_by_public_id(&user.public_id).await.unwrap();
        assert!(store.is_empty().await);
        assert!(matches!(
            store.find_by_api_key("k-eve").await,
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            store.delete_by_public_id(&user.public_id).await,
            Err(AuthError::UserNotFound)
        ));
    }
}
