//! Authentication domain models.
//!
//! These travel between the token service, the session codec and the
//! validator chain. JSON field names are camelCase to match the web client.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;

/// `email_verified_at` value of an account that has not confirmed its address.
pub const EMAIL_NOT_VERIFIED: i64 = 0;

/// A user account as seen by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    /// Stable identifier (UUIDv7).
    pub id: String,
    /// Identifier safe to show to other users.
    pub public_id: String,
    pub username: String,
    pub email: String,
    /// bcrypt hash. `None` for passwordless accounts. Never serialized.
    #[serde(skip)]
    pub password_hash: Option<String>,
    /// Unix timestamp of email confirmation, or [`EMAIL_NOT_VERIFIED`].
    pub email_verified_at: i64,
    pub roles: Vec<String>,
    pub name: String,
    /// Unix timestamp, bumped on every mutation.
    pub updated_at: i64,
}

impl AuthUser {
    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at != EMAIL_NOT_VERIFIED
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// The purpose a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    Refresh,
    Access,
    Update,
    Passwordless,
    ResetPassword,
    ChangeEmail,
    VerifyEmail,
}

impl TokenKind {
    pub const ALL: [TokenKind; 7] = [
        TokenKind::Refresh,
        TokenKind::Access,
        TokenKind::Update,
        TokenKind::Passwordless,
        TokenKind::ResetPassword,
        TokenKind::ChangeEmail,
        TokenKind::VerifyEmail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Refresh => "refresh",
            TokenKind::Access => "access",
            TokenKind::Update => "update",
            TokenKind::Passwordless => "passwordless",
            TokenKind::ResetPassword => "reset-password",
            TokenKind::ChangeEmail => "change-email",
            TokenKind::VerifyEmail => "verify-email",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AuthError::MalformedRequest(format!("unknown token type '{s}'")))
    }
}

/// JWT claims carried by every token the gateway issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID.
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    #[serde(default)]
    pub roles: Vec<String>,
    /// One-time passcode binding the token to the account state it was issued for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    #[serde(
        default,
        rename = "redirectUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub redirect_url: Option<String>,
    /// New address for change-email tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    /// Fails with [`AuthError::WrongTokenKind`] unless the token is of `kind`.
    pub fn require_kind(&self, kind: TokenKind) -> Result<(), AuthError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(AuthError::WrongTokenKind {
                expected: kind,
                actual: self.kind,
            })
        }
    }
}

/// Optional claims attached at issue time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenExtra {
    pub otp: Option<String>,
    pub redirect_url: Option<String>,
    pub email: Option<String>,
}

/// Request body shared by the auth routes. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginBody {
    pub username: String,
    pub email: String,
    pub password: String,
    pub public_id: String,
    pub name: String,
    pub otp: String,
    pub redirect_url: Option<String>,
    pub stay_signed_in: bool,
    pub api_key: String,
    /// Admin account management only.
    pub roles: Vec<String>,
    pub email_is_verified: bool,
}

/// A parsed mailbox: `Jane Doe <jane@example.com>` or a bare address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub name: Option<String>,
    /// Lowercased `local@domain`.
    pub address: String,
}

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AuthError::InvalidEmail("email address is empty".into()));
        }

        let (name, address) = match (raw.rfind('<'), raw.ends_with('>')) {
            (Some(open), true) => {
                let name = raw[..open].trim().trim_matches('"').trim();
                let name = (!name.is_empty()).then(|| name.to_string());
                (name, &raw[open + 1..raw.len() - 1])
            }
            (None, false) => (None, raw),
            _ => return Err(AuthError::InvalidEmail(format!("'{raw}' is malformed"))),
        };

        check_address(address)?;

        Ok(Self {
            name,
            address: address.to_lowercase(),
        })
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

fn check_address(address: &str) -> Result<(), AuthError> {
    let invalid = |reason: &str| AuthError::InvalidEmail(format!("'{address}' {reason}"));

    if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("contains whitespace"));
    }
    let (local, domain) = address
        .split_once('@')
        .ok_or_else(|| invalid("is missing '@'"))?;
    if domain.contains('@') {
        return Err(invalid("has more than one '@'"));
    }
    if local.is_empty() || local.len() > 64 {
        return Err(invalid("has an invalid local part"));
    }
    if !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err(invalid("has an invalid domain"));
    }
    if domain
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '.'))
    {
        return Err(invalid("has an invalid domain"));
    }
    Ok(())
}

/// Session contents: the user snapshot and the session's validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user: AuthUser,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub stay_signed_in: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_kind_uses_kebab_case_on_the_wire() {
        let json = serde_json::to_string(&TokenKind::ResetPassword).unwrap();
        assert_eq!(json, "\"reset-password\"");
        assert_eq!(
            "verify-email".parse::<TokenKind>().unwrap(),
            TokenKind::VerifyEmail
        );
        assert!("bogus".parse::<TokenKind>().is_err());
    }

    #[test]
    fn require_kind_reports_both_kinds() {
        let claims = TokenClaims {
            sub: "u1".into(),
            kind: TokenKind::Refresh,
            roles: vec![],
            otp: None,
            redirect_url: None,
            email: None,
            iss: "edb".into(),
            iat: 0,
            exp: 0,
        };
        assert!(claims.require_kind(TokenKind::Refresh).is_ok());
        match claims.require_kind(TokenKind::Access) {
            Err(AuthError::WrongTokenKind { expected, actual }) => {
                assert_eq!(expected, TokenKind::Access);
                assert_eq!(actual, TokenKind::Refresh);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = AuthUser {
            id: "1".into(),
            public_id: "p1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: Some("$2b$10$secret".into()),
            email_verified_at: 0,
            roles: vec!["user".into()],
            name: "Alice".into(),
            updated_at: 0,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"publicId\":\"p1\""));
    }

    #[test]
    fn login_body_defaults_missing_fields() {
        let body: LoginBody = serde_json::from_str(r#"{"username":"bob"}"#).unwrap();
        assert_eq!(body.username, "bob");
        assert!(body.password.is_empty());
        assert!(!body.stay_signed_in);
        assert!(body.redirect_url.is_none());
        assert!(body.roles.is_empty());
        assert!(!body.email_is_verified);
    }

    #[test]
    fn parses_bare_and_named_addresses() {
        let bare = EmailAddress::parse(" Bob@Example.com ").unwrap();
        assert_eq!(bare.address, "bob@example.com");
        assert!(bare.name.is_none());

        let named = EmailAddress::parse("\"Jane Doe\" <jane@example.org>").unwrap();
        assert_eq!(named.name.as_deref(), Some("Jane Doe"));
        assert_eq!(named.address, "jane@example.org");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in [
            "",
            "no-at-sign",
            "@example.com",
            "a@b@example.com",
            "user@localhost",
            "user@.example.com",
            "user@example..com",
            "us er@example.com",
            "Jane <jane@example.com",
        ] {
            assert!(EmailAddress::parse(raw).is_err(), "accepted {raw:?}");
        }
    }
}
