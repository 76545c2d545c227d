//! API server configuration.
//!
//! Built once at startup from environment variables and carried in
//! [`AppState`](crate::AppState).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use edb_core::auth::identity::{KeySource, ProviderConfig};
use edb_core::auth::otp::OtpConfig;
use edb_core::auth::session::{SameSitePolicy, SessionConfig};
use edb_core::auth::tokens::{TokenConfig, TokenTtls};
use jsonwebtoken::Algorithm;
use thiserror::Error;

/// Rules used when `ACCESS_RULES_FILE` is not set.
pub const DEFAULT_ACCESS_RULES: &str = r#"{
    "rules": [
        { "methods": ["GET"], "path": "/about", "roles": ["*"] },
        { "path": "/admin/*", "roles": ["admin"] }
    ]
}"#;

pub const DEFAULT_MAIL_CHANNEL: &str = "edb:mail";

/// Minimum `SESSION_KEY` length accepted by the cookie crate.
pub const MIN_SESSION_KEY_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Bytes that must not show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(pub Vec<u8>);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Front-end pages that emailed tokens link to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkUrls {
    pub verify_email: Option<String>,
    pub reset_password: Option<String>,
    pub reset_email: Option<String>,
    pub sign_in: Option<String>,
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL URL. Without one, users are kept in memory.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Redis URL for the OTP cache and the mail queue (cargo feature `redis`).
    pub redis_url: Option<String>,
    /// Redis channel outbound mail is published on.
    pub mail_channel: String,
    pub tokens: TokenConfig,
    pub session: SessionConfig,
    /// Cookie encryption key. A random key is generated when unset, which
    /// invalidates sessions on restart.
    pub session_key: Option<Secret>,
    pub otp: OtpConfig,
    pub access_rules_path: Option<PathBuf>,
    pub providers: Vec<ProviderConfig>,
    pub links: LinkUrls,
    /// Allowed CORS origins; empty allows any.
    pub cors_origins: Vec<String>,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                     | Default                  |
    /// |------------------------------|--------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:8080`         |
    /// | `DATABASE_URL`               | unset (in-memory users)  |
    /// | `REDIS_URL`                  | unset (in-memory cache)  |
    /// | `MAIL_CHANNEL`               | `edb:mail`               |
    /// | `JWT_ALGORITHM`              | `EdDSA`                  |
    /// | `JWT_PRIVATE_KEY[_FILE]`     | required                 |
    /// | `JWT_PUBLIC_KEY[_FILE]`      | required                 |
    /// | `JWT_ISSUER`                 | `edb`                    |
    /// | `SESSION_TTL_HOURS`          | `168`                    |
    /// | `SESSION_KEY`                | random per process       |
    /// | `OTP_MAX_ATTEMPTS`           | `5`                      |
    /// | `ACCESS_RULES_FILE`          | built-in rules           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`ApiConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let algorithm = match env.get("JWT_ALGORITHM") {
            Some(alg) => Algorithm::from_str(&alg).map_err(|e| ConfigError::Invalid {
                var: "JWT_ALGORITHM",
                reason: e.to_string(),
            })?,
            None => Algorithm::EdDSA,
        };

        let defaults = TokenTtls::default();
        let tokens = TokenConfig {
            algorithm,
            private_key_pem: env.pem("JWT_PRIVATE_KEY", "JWT_PRIVATE_KEY_FILE")?,
            public_key_pem: env.pem("JWT_PUBLIC_KEY", "JWT_PUBLIC_KEY_FILE")?,
            issuer: env.get("JWT_ISSUER").unwrap_or_else(|| "edb".into()),
            ttls: TokenTtls {
                access: env.minutes("ACCESS_TOKEN_TTL_MINS", defaults.access)?,
                update: env.minutes("UPDATE_TOKEN_TTL_MINS", defaults.update)?,
                refresh: env.hours("REFRESH_TOKEN_TTL_HOURS", defaults.refresh)?,
                passwordless: env.minutes("PASSWORDLESS_TOKEN_TTL_MINS", defaults.passwordless)?,
                short: env.minutes("SHORT_TOKEN_TTL_MINS", defaults.short)?,
            },
            leeway_secs: env.parse("JWT_LEEWAY_SECS")?.unwrap_or(0),
        };

        let session_defaults = SessionConfig::default();
        let session = SessionConfig {
            cookie_name: env
                .get("SESSION_COOKIE_NAME")
                .unwrap_or(session_defaults.cookie_name),
            csrf_cookie_name: env
                .get("CSRF_COOKIE_NAME")
                .unwrap_or(session_defaults.csrf_cookie_name),
            ttl: env.hours("SESSION_TTL_HOURS", session_defaults.ttl)?,
            domain: env.get("SESSION_COOKIE_DOMAIN"),
            secure: env
                .parse("SESSION_COOKIE_SECURE")?
                .unwrap_or(session_defaults.secure),
            same_site: match env.get("SESSION_COOKIE_SAMESITE") {
                Some(v) => SameSitePolicy::from_str(&v).map_err(|reason| ConfigError::Invalid {
                    var: "SESSION_COOKIE_SAMESITE",
                    reason,
                })?,
                None => session_defaults.same_site,
            },
        };

        let session_key = match env.get("SESSION_KEY") {
            Some(key) if key.len() < MIN_SESSION_KEY_LEN => {
                return Err(ConfigError::Invalid {
                    var: "SESSION_KEY",
                    reason: format!("must be at least {MIN_SESSION_KEY_LEN} bytes"),
                });
            }
            Some(key) => Some(Secret(key.into_bytes())),
            None => None,
        };

        let otp_defaults = OtpConfig::default();
        let otp = OtpConfig {
            code_ttl: env.minutes("OTP_TTL_MINS", otp_defaults.code_ttl)?,
            max_attempts: env
                .parse("OTP_MAX_ATTEMPTS")?
                .unwrap_or(otp_defaults.max_attempts),
            window: env.minutes("OTP_WINDOW_MINS", otp_defaults.window)?,
        };

        Ok(Self {
            bind_addr: env
                .get("BIND_ADDR")
                .unwrap_or_else(|| "127.0.0.1:8080".into()),
            database_url: env.get("DATABASE_URL"),
            database_max_connections: env.parse("DATABASE_MAX_CONNECTIONS")?.unwrap_or(5),
            redis_url: env.get("REDIS_URL"),
            mail_channel: env
                .get("MAIL_CHANNEL")
                .unwrap_or_else(|| DEFAULT_MAIL_CHANNEL.into()),
            tokens,
            session,
            session_key,
            otp,
            access_rules_path: env.get("ACCESS_RULES_FILE").map(PathBuf::from),
            providers: providers(&env)?,
            links: LinkUrls {
                verify_email: env.get("URL_VERIFY_EMAIL"),
                reset_password: env.get("URL_RESET_PASSWORD"),
                reset_email: env.get("URL_RESET_EMAIL"),
                sign_in: env.get("URL_SIGN_IN"),
            },
            cors_origins: env
                .get("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

/// OIDC-style providers keyed by env prefix: issuer, audience, and a JWKS
/// URL defaulting to the issuer's well-known document.
const OIDC_PROVIDERS: [(&str, &str); 3] = [
    ("auth0", "AUTH0"),
    ("clerk", "CLERK"),
    ("cognito", "COGNITO"),
];

fn providers(env: &Env<'_>) -> Result<Vec<ProviderConfig>, ConfigError> {
    let mut providers = Vec::new();

    for (name, prefix) in OIDC_PROVIDERS {
        let Some(issuer) = env.get(&format!("{prefix}_ISSUER")) else {
            continue;
        };
        let jwks_url = env.get(&format!("{prefix}_JWKS_URL")).unwrap_or_else(|| {
            format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'))
        });
        let mut config = ProviderConfig::new(name, KeySource::Jwks { url: jwks_url });
        config.issuer = Some(issuer);
        config.audience = env.get(&format!("{prefix}_AUDIENCE"));
        if let Some(claim) = env.get(&format!("{prefix}_EMAIL_CLAIM")) {
            config.email_claim = claim;
        }
        if let Some(claim) = env.get(&format!("{prefix}_NAME_CLAIM")) {
            config.name_claim = claim;
        }
        providers.push(config);
    }

    if let Some(secret) = env.get("SUPABASE_JWT_SECRET") {
        let mut config = ProviderConfig::new("supabase", KeySource::Secret(secret.into_bytes()));
        config.issuer = env.get("SUPABASE_ISSUER");
        config.audience = Some(
            env.get("SUPABASE_AUDIENCE")
                .unwrap_or_else(|| "authenticated".into()),
        );
        providers.push(config);
    }

    Ok(providers)
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T::Err: fmt::Display,
    {
        self.get(name)
            .map(|v| {
                v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                    var: name,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn minutes(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .parse::<u64>(name)?
            .map_or(default, |m| Duration::from_secs(m * 60)))
    }

    fn hours(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .parse::<u64>(name)?
            .map_or(default, |h| Duration::from_secs(h * 60 * 60)))
    }

    /// A PEM given inline in `var`, or read from the path in `file_var`.
    fn pem(&self, var: &'static str, file_var: &'static str) -> Result<Vec<u8>, ConfigError> {
        if let Some(pem) = self.get(var) {
            return Ok(pem.replace("\\n", "\n").into_bytes());
        }
        let path = PathBuf::from(self.get(file_var).ok_or(ConfigError::Missing(file_var))?);
        std::fs::read(&path).map_err(|source| ConfigError::Io { path, source })
    }
}
