// @zen-component: AUTH-Validator
//
//! Request validator chain.
//!
//! A [`Validator`] carries a `Result` through a sequence of steps. Each step
//! consumes the validator and returns it; once the result holds an error,
//! every later step is a no-op and the first error is what the terminal
//! ([`Validator::ok`] or [`Validator::success`]) reports.
//!
//! ```ignore
//! let state = Validator::new(users.as_ref())
//!     .with_body(&body)
//!     .check_email_is_well_formed()
//!     .load_auth_user_from_email()
//!     .await
//!     .check_user_has_verified_email_address()
//!     .ok()?;
//! ```
//!
//! Steps pull in their prerequisites: loading a user by email parses the
//! body and checks the address first.

use tracing::debug;

use super::AuthError;
use crate::models::auth::{AuthUser, EmailAddress, LoginBody, TokenClaims, TokenKind};
use crate::users::UserStore;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Usernames are 3–64 characters of `[A-Za-z0-9._@-]`.
pub fn check_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(AuthError::InvalidUsername(format!(
            "must be {MIN_USERNAME_LENGTH} to {MAX_USERNAME_LENGTH} characters"
        )));
    }
    if let Some(c) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-')))
    {
        return Err(AuthError::InvalidUsername(format!(
            "'{c}' is not allowed"
        )));
    }
    Ok(())
}

/// What the chain has resolved so far.
#[derive(Debug, Clone, Default)]
pub struct ValidatorState {
    pub body: Option<LoginBody>,
    pub address: Option<EmailAddress>,
    pub user: Option<AuthUser>,
    pub claims: Option<TokenClaims>,
}

impl ValidatorState {
    pub fn body(&self) -> Result<&LoginBody, AuthError> {
        self.body
            .as_ref()
            .ok_or_else(|| AuthError::MalformedRequest("request body not parsed".into()))
    }

    pub fn address(&self) -> Result<&EmailAddress, AuthError> {
        self.address
            .as_ref()
            .ok_or_else(|| AuthError::InvalidEmail("no email address".into()))
    }

    pub fn user(&self) -> Result<&AuthUser, AuthError> {
        self.user.as_ref().ok_or(AuthError::UserNotFound)
    }

    pub fn claims(&self) -> Result<&TokenClaims, AuthError> {
        self.claims.as_ref().ok_or(AuthError::MissingClaims)
    }
}

pub struct Validator<'a> {
    users: &'a dyn UserStore,
    raw_body: &'a [u8],
    supplied_claims: Option<TokenClaims>,
    state: Result<ValidatorState, AuthError>,
}

impl<'a> Validator<'a> {
    pub fn new(users: &'a dyn UserStore) -> Self {
        Self {
            users,
            raw_body: &[],
            supplied_claims: None,
            state: Ok(ValidatorState::default()),
        }
    }

    /// Raw JSON request body, parsed on demand.
    pub fn with_body(mut self, raw_body: &'a [u8]) -> Self {
        self.raw_body = raw_body;
        self
    }

    /// Claims of an already verified token, usually from middleware.
    pub fn with_claims(mut self, claims: Option<TokenClaims>) -> Self {
        self.supplied_claims = claims;
        self
    }

    /// Runs `f` against the state unless the chain has already failed.
    fn step(
        mut self,
        f: impl FnOnce(&mut ValidatorState, &[u8], &Option<TokenClaims>) -> Result<(), AuthError>,
    ) -> Self {
        if let Ok(state) = &mut self.state
            && let Err(e) = f(state, self.raw_body, &self.supplied_claims)
        {
            debug!(error = %e, "validation failed");
            self.state = Err(e);
        }
        self
    }

    /// Reads a value out of a successful state.
    fn resolved<T>(&self, f: impl FnOnce(&ValidatorState) -> Option<T>) -> Option<T> {
        self.state.as_ref().ok().and_then(f)
    }

    fn set_user(mut self, result: Result<AuthUser, AuthError>) -> Self {
        match result {
            Ok(user) => {
                if let Ok(state) = &mut self.state {
                    state.user = Some(user);
                }
            }
            Err(e) => {
                debug!(error = %e, "user lookup failed");
                self.state = Err(e);
            }
        }
        self
    }

    pub fn parse_login_request_body(self) -> Self {
        self.step(|state, raw, _| {
            if state.body.is_some() {
                return Ok(());
            }
            let body = if raw.iter().all(u8::is_ascii_whitespace) {
                LoginBody::default()
            } else {
                serde_json::from_slice(raw)
                    .map_err(|e| AuthError::MalformedRequest(e.to_string()))?
            };
            state.body = Some(body);
            Ok(())
        })
    }

    pub fn check_username_is_well_formed(self) -> Self {
        self.parse_login_request_body()
            .step(|state, _, _| check_username(&state.body()?.username))
    }

    /// Parses `email` from the body into [`ValidatorState::address`].
    pub fn check_email_is_well_formed(self) -> Self {
        self.parse_login_request_body().step(|state, _, _| {
            if state.address.is_none() {
                state.address = Some(EmailAddress::parse(&state.body()?.email)?);
            }
            Ok(())
        })
    }

    /// Looks the user up by `username`, or by email when it is address-shaped.
    pub async fn load_auth_user_from_username(self) -> Self {
        let v = self.check_username_is_well_formed();
        let Some(username) = v.resolved(|s| s.body.as_ref().map(|b| b.username.clone())) else {
            return v;
        };
        let result = if username.contains('@') {
            v.users.find_by_email(&username).await
        } else {
            v.users.find_by_username(&username).await
        };
        v.set_user(result)
    }

    pub async fn load_auth_user_from_email(self) -> Self {
        let v = self.check_email_is_well_formed();
        let Some(email) = v.resolved(|s| s.address.as_ref().map(|a| a.address.clone())) else {
            return v;
        };
        let result = v.users.find_by_email(&email).await;
        v.set_user(result)
    }

    pub async fn load_auth_user_from_public_id(self) -> Self {
        let v = self.parse_login_request_body().step(|state, _, _| {
            if state.body()?.public_id.is_empty() {
                return Err(AuthError::MalformedRequest("publicId is required".into()));
            }
            Ok(())
        });
        let Some(public_id) = v.resolved(|s| s.body.as_ref().map(|b| b.public_id.clone())) else {
            return v;
        };
        let result = v.users.find_by_public_id(&public_id).await;
        v.set_user(result)
    }

    /// Moves the supplied claims into the state.
    pub fn load_token_claims(self) -> Self {
        self.step(|state, _, supplied| {
            if state.claims.is_none() {
                state.claims = Some(supplied.clone().ok_or(AuthError::MissingClaims)?);
            }
            Ok(())
        })
    }

    /// Looks the user up by the token subject.
    pub async fn load_auth_user_from_token(self) -> Self {
        let v = self.load_token_claims();
        let Some(subject) = v.resolved(|s| s.claims.as_ref().map(|c| c.sub.clone())) else {
            return v;
        };
        let result = v.users.find_by_id(&subject).await;
        v.set_user(result)
    }

    pub fn check_auth_user_is_loaded(self) -> Self {
        self.step(|state, _, _| state.user().map(|_| ()))
    }

    pub fn check_user_has_verified_email_address(self) -> Self {
        self.check_auth_user_is_loaded().step(|state, _, _| {
            if state.user()?.is_email_verified() {
                Ok(())
            } else {
                Err(AuthError::EmailNotVerified)
            }
        })
    }

    /// Requires the `login` role (or an admin role).
    pub fn check_user_can_sign_in(self) -> Self {
        self.check_auth_user_is_loaded().step(|state, _, _| {
            if super::roles::can_sign_in(&state.user()?.roles) {
                Ok(())
            } else {
                Err(AuthError::NotAllowedToSignIn)
            }
        })
    }

    pub fn check_token_kind(self, kind: TokenKind) -> Self {
        self.load_token_claims()
            .step(|state, _, _| state.claims()?.require_kind(kind))
    }

    pub fn check_is_valid_refresh_token(self) -> Self {
        self.check_token_kind(TokenKind::Refresh)
    }

    pub fn check_is_valid_access_token(self) -> Self {
        self.check_token_kind(TokenKind::Access)
    }

    pub fn check_is_valid_update_token(self) -> Self {
        self.check_token_kind(TokenKind::Update)
    }

    /// The resolved state, or the first error.
    pub fn ok(self) -> Result<ValidatorState, AuthError> {
        self.state
    }

    /// Runs `f` on the resolved state only if every step succeeded.
    ///
    /// `f` may return a future, awaited by the caller:
    /// `v.success(|s| async move { .. })?.await`.
    pub fn success<T>(self, f: impl FnOnce(ValidatorState) -> T) -> Result<T, AuthError> {
        self.state.map(f)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::users::{MemoryUserStore, NewUser};

    /// Counts lookups made through it.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryUserStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl UserStore for CountingStore {
        async fn find_by_id(&self, id: &str) -> Result<AuthUser, AuthError> {
            self.hit();
            self.inner.find_by_id(id).await
        }
        async fn find_by_public_id(&self, public_id: &str) -> Result<AuthUser, AuthError> {
            self.hit();
            self.inner.find_by_public_id(public_id).await
        }
        async fn find_by_username(&self, username: &str) -> Result<AuthUser, AuthError> {
            self.hit();
            self.inner.find_by_username(username).await
        }
        async fn find_by_email(&self, email: &str) -> Result<AuthUser, AuthError> {
            self.hit();
            self.inner.find_by_email(email).await
        }
        async fn find_by_api_key(&self, api_key: &str) -> Result<AuthUser, AuthError> {
            self.hit();
            self.inner.find_by_api_key(api_key).await
        }
        async fn create_from_signup(&self, user: &NewUser) -> Result<AuthUser, AuthError> {
            self.inner.create_from_signup(user).await
        }
        async fn create_from_oauth2(&self, name: &str, email: &str) -> Result<AuthUser, AuthError> {
            self.inner.create_from_oauth2(name, email).await
        }
        async fn set_email_verified(&self, id: &str) -> Result<AuthUser, AuthError> {
            self.inner.set_email_verified(id).await
        }
        async fn set_password(&self, id: &str, password: &str) -> Result<AuthUser, AuthError> {
            self.inner.set_password(id, password).await
        }
        async fn set_email(&self, id: &str, email: &str) -> Result<AuthUser, AuthError> {
            self.inner.set_email(id, email).await
        }
        async fn set_user_info(
            &self,
            id: &str,
            username: &str,
            name: &str,
        ) -> Result<AuthUser, AuthError> {
            self.inner.set_user_info(id, username, name).await
        }
        async fn set_roles(&self, id: &str, roles: &[String]) -> Result<AuthUser, AuthError> {
            self.inner.set_roles(id, roles).await
        }
        async fn users(&self, offset: u64, records: u64) -> Result<Vec<AuthUser>, AuthError> {
            self.inner.users(offset, records).await
        }
        async fn count(&self) -> Result<u64, AuthError> {
            self.inner.count().await
        }
        async fn delete_by_public_id(&self, public_id: &str) -> Result<(), AuthError> {
            self.inner.delete_by_public_id(public_id).await
        }
    }

    async fn store_with_alice(verified: bool) -> (CountingStore, AuthUser) {
        let store = CountingStore::default();
        let mut user = store
            .inner
            .create_from_signup(&NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: String::new(),
                name: "Alice".into(),
            })
            .await
            .unwrap();
        if verified {
            user = store.inner.set_email_verified(&user.id).await.unwrap();
        }
        (store, user)
    }

    fn claims(sub: &str, kind: TokenKind) -> TokenClaims {
        TokenClaims {
            sub: sub.into(),
            kind,
            roles: vec![],
            otp: None,
            redirect_url: None,
            email: None,
            iss: "edb-test".into(),
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[tokio::test]
    async fn malformed_email_short_circuits_before_the_store() {
        let (store, user) = store_with_alice(true).await;
        let result = Validator::new(&store)
            .with_body(br#"{"email":"not-an-address"}"#)
            .with_claims(Some(claims(&user.id, TokenKind::Access)))
            .check_email_is_well_formed()
            .load_auth_user_from_token()
            .await
            .check_user_has_verified_email_address()
            .ok();
        assert!(matches!(result, Err(AuthError::InvalidEmail(_))));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn loads_user_from_username_or_address() {
        let (store, user) = store_with_alice(true).await;

        let by_name = Validator::new(&store)
            .with_body(br#"{"username":"alice"}"#)
            .load_auth_user_from_username()
            .await
            .ok()
            .unwrap();
        assert_eq!(by_name.user().unwrap().id, user.id);

        let by_address = Validator::new(&store)
            .with_body(br#"{"username":"Alice@Example.com"}"#)
            .load_auth_user_from_username()
            .await
            .ok()
            .unwrap();
        assert_eq!(by_address.user().unwrap().id, user.id);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (store, _) = store_with_alice(true).await;
        let result = Validator::new(&store)
            .with_body(br#"{"email":"nobody@example.com"}"#)
            .load_auth_user_from_email()
            .await
            .ok();
        assert!(matches!(result, Err(AuthError::UserNotFound)));
    }

    #[tokio::test]
    async fn unverified_user_is_rejected() {
        let (store, _) = store_with_alice(false).await;
        let result = Validator::new(&store)
            .with_body(br#"{"email":"alice@example.com"}"#)
            .load_auth_user_from_email()
            .await
            .check_user_has_verified_email_address()
            .ok();
        assert!(matches!(result, Err(AuthError::EmailNotVerified)));
    }

    #[tokio::test]
    async fn first_error_wins() {
        let (store, _) = store_with_alice(true).await;
        let result = Validator::new(&store)
            .with_body(b"{not json")
            .check_username_is_well_formed()
            .check_is_valid_access_token()
            .ok();
        assert!(matches!(result, Err(AuthError::MalformedRequest(_))));
    }

    #[tokio::test]
    async fn token_kind_checks() {
        let (store, user) = store_with_alice(true).await;

        let refresh = Some(claims(&user.id, TokenKind::Refresh));
        assert!(
            Validator::new(&store)
                .with_claims(refresh.clone())
                .check_is_valid_refresh_token()
                .ok()
                .is_ok()
        );
        assert!(matches!(
            Validator::new(&store)
                .with_claims(refresh)
                .check_is_valid_access_token()
                .ok(),
            Err(AuthError::WrongTokenKind { .. })
        ));
        assert!(matches!(
            Validator::new(&store).check_is_valid_update_token().ok(),
            Err(AuthError::MissingClaims)
        ));
    }

    #[tokio::test]
    async fn loads_user_from_token_subject() {
        let (store, user) = store_with_alice(true).await;
        let state = Validator::new(&store)
            .with_claims(Some(claims(&user.id, TokenKind::Access)))
            .check_is_valid_access_token()
            .load_auth_user_from_token()
            .await
            .check_user_can_sign_in()
            .ok()
            .unwrap();
        assert_eq!(state.user().unwrap().email, "alice@example.com");
    }

    #[tokio::test]
    async fn public_id_is_required() {
        let (store, user) = store_with_alice(true).await;
        let missing = Validator::new(&store)
            .with_body(b"{}")
            .load_auth_user_from_public_id()
            .await
            .ok();
        assert!(matches!(missing, Err(AuthError::MalformedRequest(_))));

        let body = format!(r#"{{"publicId":"{}"}}"#, user.public_id);
        let found = Validator::new(&store)
            .with_body(body.as_bytes())
            .load_auth_user_from_public_id()
            .await
            .ok()
            .unwrap();
        assert_eq!(found.user().unwrap().id, user.id);
    }

    #[tokio::test]
    async fn success_runs_only_when_every_step_passed() {
        let (store, _) = store_with_alice(true).await;

        let value = Validator::new(&store)
            .with_body(br#"{"username":"bob_1"}"#)
            .check_username_is_well_formed()
            .success(|state| state.body.map(|b| b.username))
            .unwrap();
        assert_eq!(value.as_deref(), Some("bob_1"));

        let mut ran = false;
        let result = Validator::new(&store)
            .with_body(br#"{"username":"x"}"#)
            .check_username_is_well_formed()
            .success(|_| ran = true);
        assert!(matches!(result, Err(AuthError::InvalidUsername(_))));
        assert!(!ran);
    }

    #[test]
    fn username_rule() {
        assert!(check_username("bob").is_ok());
        assert!(check_username("jane.doe@example.com").is_ok());
        assert!(check_username("ab").is_err());
        assert!(check_username("has space").is_err());
        assert!(check_username(&"a".repeat(65)).is_err());
    }
}
