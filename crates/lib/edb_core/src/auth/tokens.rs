// @zen-component: AUTH-TokenService
//
//! JWT issuance and verification with the gateway's own asymmetric key pair.
//!
//! Every token carries a [`TokenKind`]. [`TokenService::parse`] checks
//! signature, issuer and expiry only; routes check the kind themselves with
//! [`TokenClaims::require_kind`] so that a wrong kind is reported as such
//! rather than as a bad token.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sha2::{Digest, Sha256};

use super::AuthError;
use crate::models::auth::{AuthUser, TokenClaims, TokenExtra, TokenKind};

/// Default lifetime of access and update tokens: 15 minutes.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
/// Default lifetime of refresh tokens: 7 days.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Default lifetime of emailed single-purpose tokens: 10 minutes.
pub const DEFAULT_SHORT_TTL: Duration = Duration::from_secs(10 * 60);

/// Per-kind token lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTtls {
    pub access: Duration,
    pub update: Duration,
    pub refresh: Duration,
    pub passwordless: Duration,
    /// reset-password, change-email and verify-email.
    pub short: Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: DEFAULT_ACCESS_TTL,
            update: DEFAULT_ACCESS_TTL,
            refresh: DEFAULT_REFRESH_TTL,
            passwordless: DEFAULT_SHORT_TTL,
            short: DEFAULT_SHORT_TTL,
        }
    }
}

impl TokenTtls {
    pub fn get(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access,
            TokenKind::Update => self.update,
            TokenKind::Refresh => self.refresh,
            TokenKind::Passwordless => self.passwordless,
            TokenKind::ResetPassword | TokenKind::ChangeEmail | TokenKind::VerifyEmail => {
                self.short
            }
        }
    }
}

/// Key material and policy for the local token issuer.
#[derive(Clone)]
pub struct TokenConfig {
    /// RS*/PS*, ES256/ES384 or EdDSA.
    pub algorithm: Algorithm,
    pub private_key_pem: Vec<u8>,
    pub public_key_pem: Vec<u8>,
    pub issuer: String,
    pub ttls: TokenTtls,
    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("algorithm", &self.algorithm)
            .field("private_key_pem", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("ttls", &self.ttls)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

/// Issues and parses gateway tokens. Built once at startup and shared.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    ttls: TokenTtls,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Result<Self, AuthError> {
        let (encoding_key, decoding_key) = load_key_pair(
            config.algorithm,
            &config.private_key_pem,
            &config.public_key_pem,
        )?;

        let mut validation = Validation::new(config.algorithm);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = config.leeway_secs;

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm: config.algorithm,
            issuer: config.issuer.clone(),
            ttls: config.ttls.clone(),
            validation,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The configured lifetime for `kind`.
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        self.ttls.get(kind)
    }

    /// Signs a token of `kind` with the kind's default lifetime.
    pub fn issue(
        &self,
        kind: TokenKind,
        subject: &str,
        roles: &[String],
        extra: TokenExtra,
    ) -> Result<String, AuthError> {
        self.issue_with_ttl(kind, subject, roles, extra, self.ttl(kind))
    }

    pub fn issue_with_ttl(
        &self,
        kind: TokenKind,
        subject: &str,
        roles: &[String],
        extra: TokenExtra,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        self.sign(kind, subject, roles, extra, ttl, Utc::now())
    }

    fn sign(
        &self,
        kind: TokenKind,
        subject: &str,
        roles: &[String],
        extra: TokenExtra,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AuthError::Internal(format!("token ttl out of range: {e}")))?;
        let claims = TokenClaims {
            sub: subject.to_string(),
            kind,
            roles: roles.to_vec(),
            otp: extra.otp,
            redirect_url: extra.redirect_url,
            email: extra.email,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verifies signature, issuer and expiry. Does not look at the kind.
    pub fn parse(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    pub fn refresh_token(&self, user: &AuthUser) -> Result<String, AuthError> {
        self.issue(
            TokenKind::Refresh,
            &user.id,
            &user.roles,
            TokenExtra::default(),
        )
    }

    pub fn access_token(&self, subject: &str, roles: &[String]) -> Result<String, AuthError> {
        self.issue(TokenKind::Access, subject, roles, TokenExtra::default())
    }

    pub fn update_token(&self, subject: &str, roles: &[String]) -> Result<String, AuthError> {
        self.issue(TokenKind::Update, subject, roles, TokenExtra::default())
    }

    pub fn passwordless_token(
        &self,
        user: &AuthUser,
        redirect_url: Option<&str>,
    ) -> Result<String, AuthError> {
        self.issue(
            TokenKind::Passwordless,
            &user.id,
            &[],
            TokenExtra {
                redirect_url: redirect_url.map(str::to_string),
                ..TokenExtra::default()
            },
        )
    }

    /// Bound to the account's current state: stops working once the
    /// password (or anything else in the passcode) changes.
    pub fn reset_password_token(&self, user: &AuthUser) -> Result<String, AuthError> {
        self.issue(
            TokenKind::ResetPassword,
            &user.id,
            &[],
            TokenExtra {
                otp: Some(one_time_passcode(user)),
                ..TokenExtra::default()
            },
        )
    }

    pub fn change_email_token(
        &self,
        user: &AuthUser,
        new_email: &str,
    ) -> Result<String, AuthError> {
        self.issue(
            TokenKind::ChangeEmail,
            &user.id,
            &[],
            TokenExtra {
                otp: Some(one_time_passcode(user)),
                email: Some(new_email.to_string()),
                ..TokenExtra::default()
            },
        )
    }

    pub fn verify_email_token(
        &self,
        user: &AuthUser,
        redirect_url: Option<&str>,
    ) -> Result<String, AuthError> {
        self.issue(
            TokenKind::VerifyEmail,
            &user.id,
            &[],
            TokenExtra {
                redirect_url: redirect_url.map(str::to_string),
                ..TokenExtra::default()
            },
        )
    }
}

fn load_key_pair(
    algorithm: Algorithm,
    private_pem: &[u8],
    public_pem: &[u8],
) -> Result<(EncodingKey, DecodingKey), AuthError> {
    let pair = match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => EncodingKey::from_rsa_pem(private_pem)
            .and_then(|enc| Ok((enc, DecodingKey::from_rsa_pem(public_pem)?))),
        Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(private_pem)
            .and_then(|enc| Ok((enc, DecodingKey::from_ec_pem(public_pem)?))),
        Algorithm::EdDSA => EncodingKey::from_ed_pem(private_pem)
            .and_then(|enc| Ok((enc, DecodingKey::from_ed_pem(public_pem)?))),
        other => {
            return Err(AuthError::Internal(format!(
                "{other:?} is not an asymmetric signing algorithm"
            )));
        }
    };
    pair.map_err(|e| AuthError::Internal(format!("load signing keys: {e}")))
}

/// Hash of the account fields a reset-password or change-email token must
/// not outlive: id, password hash, email and `updated_at`.
pub fn one_time_passcode(user: &AuthUser) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user.id.as_bytes());
    hasher.update(b":");
    hasher.update(user.password_hash.as_deref().unwrap_or_default().as_bytes());
    hasher.update(b":");
    hasher.update(user.email.as_bytes());
    hasher.update(b":");
    hasher.update(user.updated_at.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fails unless the token's passcode matches the account as it is now.
pub fn check_one_time_passcode(user: &AuthUser, claims: &TokenClaims) -> Result<(), AuthError> {
    match claims.otp.as_deref() {
        Some(otp) if otp == one_time_passcode(user) => Ok(()),
        _ => Err(AuthError::InvalidToken(
            "token is no longer valid for this account".into(),
        )),
    }
}
