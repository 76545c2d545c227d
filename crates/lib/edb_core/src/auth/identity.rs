// @zen-component: AUTH-IdentityProviders
//
//! Verification of ID tokens issued by external identity providers
//! (Auth0, Clerk, Supabase, Cognito, ...).
//!
//! Every provider is a [`JwtIdentityVerifier`] configured with its issuer,
//! audience, key source and claim names. What happens after verification
//! (create-or-load the user, open a session) is the same for all of them
//! and lives in `edb_api`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::Value;
use tracing::{debug, info};

use super::AuthError;

/// Who the provider says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Provider name as used in routes, e.g. `auth0`.
    fn provider(&self) -> &str;

    async fn verify(&self, raw_token: &str) -> Result<ExternalIdentity, AuthError>;
}

/// Where a provider's verification keys come from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// A single PEM public key.
    Pem { algorithm: Algorithm, pem: Vec<u8> },
    /// A shared HMAC secret (HS256), as Supabase uses.
    Secret(Vec<u8>),
    /// A JWKS document, fetched once when the verifier is built.
    Jwks { url: String },
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub key: KeySource,
    /// Claim holding the email address; Auth0 often namespaces it.
    pub email_claim: String,
    pub name_claim: String,
}

impl ProviderConfig {
    pub fn new(name: &str, key: KeySource) -> Self {
        Self {
            name: name.to_string(),
            issuer: None,
            audience: None,
            key,
            email_claim: "email".to_string(),
            name_claim: "name".to_string(),
        }
    }
}

enum Keys {
    Single(DecodingKey, Algorithm),
    Jwks(JwkSet),
}

/// Asymmetric algorithms accepted from a JWKS.
const JWKS_ALGORITHMS: [Algorithm; 9] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

pub struct JwtIdentityVerifier {
    name: String,
    issuer: Option<String>,
    audience: Option<String>,
    keys: Keys,
    email_claim: String,
    name_claim: String,
}

impl JwtIdentityVerifier {
    /// Builds a verifier. JWKS key sources are fetched here with `http`.
    pub async fn from_config(
        config: ProviderConfig,
        http: &reqwest::Client,
    ) -> Result<Self, AuthError> {
        let keys = match &config.key {
            KeySource::Pem { algorithm, pem } => {
                let key = match algorithm {
                    Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
                    Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
                    _ => DecodingKey::from_rsa_pem(pem),
                }
                .map_err(|e| {
                    AuthError::Internal(format!("{} public key: {e}", config.name))
                })?;
                Keys::Single(key, *algorithm)
            }
            KeySource::Secret(secret) => {
                Keys::Single(DecodingKey::from_secret(secret), Algorithm::HS256)
            }
            KeySource::Jwks { url } => {
                let set = fetch_jwks(http, url).await?;
                info!(provider = %config.name, keys = set.keys.len(), "loaded jwks");
                Keys::Jwks(set)
            }
        };

        Ok(Self {
            name: config.name,
            issuer: config.issuer,
            audience: config.audience,
            keys,
            email_claim: config.email_claim,
            name_claim: config.name_claim,
        })
    }

    fn key_for(&self, raw_token: &str) -> Result<(DecodingKey, Algorithm), AuthError> {
        let header = decode_header(raw_token)?;
        match &self.keys {
            Keys::Single(key, algorithm) => {
                if header.alg != *algorithm {
                    return Err(AuthError::InvalidToken(format!(
                        "unexpected algorithm {:?}",
                        header.alg
                    )));
                }
                Ok((key.clone(), *algorithm))
            }
            Keys::Jwks(set) => {
                if !JWKS_ALGORITHMS.contains(&header.alg) {
                    return Err(AuthError::InvalidToken(format!(
                        "unexpected algorithm {:?}",
                        header.alg
                    )));
                }
                let kid = header
                    .kid
                    .ok_or_else(|| AuthError::InvalidToken("token has no kid".into()))?;
                let jwk = set
                    .find(&kid)
                    .ok_or_else(|| AuthError::InvalidToken(format!("unknown kid '{kid}'")))?;
                Ok((DecodingKey::from_jwk(jwk)?, header.alg))
            }
        }
    }
}

async fn fetch_jwks(http: &reqwest::Client, url: &str) -> Result<JwkSet, AuthError> {
    let fetch_error = |e: reqwest::Error| AuthError::Internal(format!("fetch jwks {url}: {e}"));
    http.get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(fetch_error)?
        .json::<JwkSet>()
        .await
        .map_err(fetch_error)
}

fn string_claim(claims: &HashMap<String, Value>, name: &str) -> Option<String> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    fn provider(&self) -> &str {
        &self.name
    }

    async fn verify(&self, raw_token: &str) -> Result<ExternalIdentity, AuthError> {
        let (key, algorithm) = self.key_for(raw_token)?;

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        match &self.issuer {
            Some(issuer) => validation.set_issuer(&[issuer.as_str()]),
            None => validation.iss = None,
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        let claims = decode::<HashMap<String, Value>>(raw_token, &key, &validation)?.claims;

        let subject = string_claim(&claims, "sub")
            .ok_or_else(|| AuthError::InvalidToken("token has no subject".into()))?;
        let email = string_claim(&claims, &self.email_claim).ok_or_else(|| {
            AuthError::InvalidToken(format!("token has no '{}' claim", self.email_claim))
        })?;
        let name = string_claim(&claims, &self.name_claim);

        debug!(provider = %self.name, subject = %subject, "verified external identity");
        Ok(ExternalIdentity {
            subject,
            email,
            name,
        })
    }
}

/// Configured verifiers keyed by provider name.
#[derive(Clone, Default)]
pub struct IdentityProviders {
    verifiers: HashMap<String, Arc<dyn IdentityVerifier>>,
}

impl IdentityProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, verifier: Arc<dyn IdentityVerifier>) {
        self.verifiers
            .insert(verifier.provider().to_string(), verifier);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn IdentityVerifier>> {
        self.verifiers.get(provider).cloned()
    }

    /// Builds and registers a verifier for every config.
    pub async fn from_configs(
        configs: Vec<ProviderConfig>,
        http: &reqwest::Client,
    ) -> Result<Self, AuthError> {
        let mut providers = Self::new();
        for config in configs {
            let verifier = JwtIdentityVerifier::from_config(config, http).await?;
            providers.register(Arc::new(verifier));
        }
        Ok(providers)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.verifiers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
