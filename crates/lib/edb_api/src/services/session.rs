// @zen-component: AUTH-SessionManager
//
//! Stateless cookie sessions.
//!
//! The whole session lives in an encrypted cookie; reading it never
//! touches the user store.

use std::sync::Arc;

use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::Utc;
use edb_core::auth::csrf::{self, CsrfToken};
use edb_core::auth::session::{self, SessionConfig};
use edb_core::auth::AuthError;
use edb_core::models::auth::{AuthUser, SessionInfo};
use tracing::debug;

use super::cookies;

#[derive(Debug, Clone)]
pub struct SessionManager {
    config: Arc<SessionConfig>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Starts a session for `user`. A durable session sets `Max-Age`; a
    /// volatile one lasts until the browser closes but still expires
    /// server-side after the configured TTL.
    pub fn init(
        &self,
        jar: PrivateCookieJar,
        user: &AuthUser,
        stay_signed_in: bool,
    ) -> Result<(PrivateCookieJar, SessionInfo), AuthError> {
        let info = session::new_session(user, stay_signed_in, self.config.ttl, Utc::now())?;
        let jar = self.store(jar, &info)?;
        debug!(user_id = %user.id, stay_signed_in, "session initialised");
        Ok((jar, info))
    }

    pub fn read(&self, jar: &PrivateCookieJar) -> Result<SessionInfo, AuthError> {
        let cookie = jar
            .get(&self.config.cookie_name)
            .ok_or(AuthError::SessionNotFound)?;
        session::decode(cookie.value(), Utc::now())
    }

    /// Replaces the user snapshot, keeping the session window and profile.
    pub fn refresh(
        &self,
        jar: PrivateCookieJar,
        current: &SessionInfo,
        user: AuthUser,
    ) -> Result<(PrivateCookieJar, SessionInfo), AuthError> {
        let info = SessionInfo {
            user,
            ..current.clone()
        };
        let jar = self.store(jar, &info)?;
        Ok((jar, info))
    }

    /// Expires the session and CSRF cookies.
    pub fn clear(&self, jar: PrivateCookieJar) -> PrivateCookieJar {
        jar.add(cookies::removal_cookie(&self.config, &self.config.cookie_name))
            .add(cookies::removal_cookie(
                &self.config,
                &self.config.csrf_cookie_name,
            ))
    }

    /// Stores a fresh CSRF token. The session cookie is left alone.
    pub fn issue_csrf(&self, jar: PrivateCookieJar) -> (PrivateCookieJar, CsrfToken) {
        let token = csrf::issue();
        let jar = jar.add(cookies::csrf_cookie(
            &self.config,
            token.as_str().to_string(),
        ));
        (jar, token)
    }

    pub fn csrf_token(&self, jar: &PrivateCookieJar) -> Option<String> {
        jar.get(&self.config.csrf_cookie_name)
            .map(|c| c.value().to_string())
    }

    fn store(
        &self,
        jar: PrivateCookieJar,
        info: &SessionInfo,
    ) -> Result<PrivateCookieJar, AuthError> {
        let max_age = info.stay_signed_in.then_some(self.config.ttl);
        let value = session::encode(info)?;
        Ok(jar.add(cookies::session_cookie(&self.config, value, max_age)))
    }
}

#[cfg(test)]
mod tests {
    use axum_extra::extract::cookie::Key;

    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            id: "u1".into(),
            public_id: "p1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: None,
            email_verified_at: 1,
            roles: vec!["user".into(), "login".into()],
            name: "Alice".into(),
            updated_at: 1,
        }
    }

    fn manager() -> (SessionManager, PrivateCookieJar) {
        (
            SessionManager::new(SessionConfig::default()),
            PrivateCookieJar::new(Key::generate()),
        )
    }

    #[test]
    fn init_then_read() {
        let (sessions, jar) = manager();
        let (jar, info) = sessions.init(jar, &user(), true).unwrap();
        assert_eq!(sessions.read(&jar).unwrap(), info);
    }

    #[test]
    fn read_without_cookie_is_not_found() {
        let (sessions, jar) = manager();
        assert!(matches!(
            sessions.read(&jar),
            Err(AuthError::SessionNotFound)
        ));
    }

    #[test]
    fn clear_removes_the_session() {
        let (sessions, jar) = manager();
        let (jar, _) = sessions.init(jar, &user(), false).unwrap();
        let jar = sessions.clear(jar);
        assert!(matches!(
            sessions.read(&jar),
            Err(AuthError::SessionNotFound)
        ));
    }

    #[test]
    fn refresh_keeps_the_window() {
        let (sessions, jar) = manager();
        let (jar, info) = sessions.init(jar, &user(), true).unwrap();
        let mut renamed = user();
        renamed.name = "Alice B".into();
        let (jar, refreshed) = sessions.refresh(jar, &info, renamed).unwrap();
        let read = sessions.read(&jar).unwrap();
        assert_eq!(read, refreshed);
        assert_eq!(read.user.name, "Alice B");
        assert_eq!(read.expires_at, info.expires_at);
        assert!(read.stay_signed_in);
    }

    #[test]
    fn csrf_is_stored_beside_the_session() {
        let (sessions, jar) = manager();
        let (jar, token) = sessions.issue_csrf(jar);
        assert_eq!(sessions.csrf_token(&jar).as_deref(), Some(token.as_str()));
        assert!(sessions.read(&jar).is_err());
    }
}
