//! # edb_api
//!
//! HTTP API library for the EDB auth gateway: the axum router, its
//! middleware and handlers, wired to `edb_core`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod services;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::FromRef;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum_extra::extract::cookie::Key;
use edb_core::access::{AccessError, AccessEvaluator, RuleEngine};
use edb_core::auth::AuthError;
use edb_core::auth::identity::IdentityProviders;
use edb_core::auth::otp::OtpService;
use edb_core::auth::tokens::TokenService;
use edb_core::cache::{MemoryTtlCache, TtlCache};
use edb_core::mail::{LogMailQueue, MailQueue};
use edb_core::users::{MemoryUserStore, PgUserStore, UserStore};
use http::{HeaderName, HeaderValue, Method, header};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{ApiConfig, ConfigError, DEFAULT_ACCESS_RULES, Secret};
use crate::error::AppError;
use crate::handlers::{
    about, admin, email, oauth2, otp, password, passwordless, session, signin, signup, tokens,
    users,
};
use crate::middleware::auth::{
    require_access_token, require_token, require_update_token, require_verify_email_token,
};
use crate::middleware::csrf::require_csrf;
use crate::middleware::rbac::rbac;
use crate::middleware::session::require_session;
use crate::services::session::SessionManager;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub tokens: Arc<TokenService>,
    pub otp: Arc<OtpService>,
    pub sessions: SessionManager,
    pub users: Arc<dyn UserStore>,
    pub mail: Arc<dyn MailQueue>,
    pub access: Arc<dyn AccessEvaluator>,
    pub identity: IdentityProviders,
    /// Encrypts the session and CSRF cookies.
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("auth setup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("access rules: {0}")]
    Access(#[from] AccessError),

    #[error("database: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[cfg(feature = "redis")]
    #[error("cache: {0}")]
    Cache(#[from] edb_core::cache::CacheError),

    #[cfg(feature = "redis")]
    #[error("mail queue: {0}")]
    Mail(#[from] edb_core::mail::MailError),

    #[error("invalid SESSION_KEY: {0}")]
    SessionKey(String),
}

impl AppState {
    /// Connects the backing services named by `config`.
    pub async fn from_config(config: ApiConfig) -> Result<Self, StartupError> {
        let tokens = TokenService::new(&config.tokens)?;

        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .acquire_timeout(Duration::from_secs(30))
                    .connect(url)
                    .await?;
                info!("running database migrations");
                edb_core::users::migrate(&pool).await?;
                Arc::new(PgUserStore::new(pool))
            }
            None => {
                warn!("DATABASE_URL is not set, keeping users in memory");
                Arc::new(MemoryUserStore::new())
            }
        };

        let access = match &config.access_rules_path {
            Some(path) => RuleEngine::load(path)?,
            None => RuleEngine::from_json(DEFAULT_ACCESS_RULES)?,
        };

        let identity =
            IdentityProviders::from_configs(config.providers.clone(), &reqwest::Client::new())
                .await?;
        info!(providers = ?identity.names(), "identity providers ready");

        let cookie_key = match &config.session_key {
            Some(Secret(bytes)) => Key::try_from(bytes.as_slice())
                .map_err(|e| StartupError::SessionKey(e.to_string()))?,
            None => {
                warn!("SESSION_KEY is not set, sessions will not survive a restart");
                Key::generate()
            }
        };

        let cache = build_cache(&config).await?;
        let mail = build_mail(&config).await?;

        Ok(Self {
            tokens: Arc::new(tokens),
            otp: Arc::new(OtpService::new(cache, config.otp.clone())),
            sessions: SessionManager::new(config.session.clone()),
            users,
            mail,
            access: Arc::new(access),
            identity,
            cookie_key,
            config: Arc::new(config),
        })
    }
}

#[cfg(feature = "redis")]
async fn build_cache(config: &ApiConfig) -> Result<Arc<dyn TtlCache>, StartupError> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(edb_core::cache::RedisTtlCache::connect(url).await?)),
        None => Ok(Arc::new(MemoryTtlCache::new())),
    }
}

#[cfg(not(feature = "redis"))]
async fn build_cache(config: &ApiConfig) -> Result<Arc<dyn TtlCache>, StartupError> {
    if config.redis_url.is_some() {
        warn!("REDIS_URL is set but the redis feature is off, using an in-memory cache");
    }
    Ok(Arc::new(MemoryTtlCache::new()))
}

#[cfg(feature = "redis")]
async fn build_mail(config: &ApiConfig) -> Result<Arc<dyn MailQueue>, StartupError> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(
            edb_core::mail::RedisMailQueue::connect(url, &config.mail_channel).await?,
        )),
        None => Ok(log_mail()),
    }
}

#[cfg(not(feature = "redis"))]
async fn build_mail(_config: &ApiConfig) -> Result<Arc<dyn MailQueue>, StartupError> {
    Ok(log_mail())
}

fn log_mail() -> Arc<dyn MailQueue> {
    warn!("no mail queue configured, emails are logged without their tokens");
    Arc::new(LogMailQueue)
}

fn cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(edb_core::auth::csrf::CSRF_HEADER),
        ])
        .allow_credentials(true)
}

fn handle_panic(_: Box<dyn Any + Send + 'static>) -> Response {
    error!("handler panicked");
    AppError::Internal("handler panicked".into()).into_response()
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // No credentials needed up front
    let public = Router::new()
        .route("/signup", post(signup::signup))
        .route("/auth/signin", post(signin::signin))
        .route("/auth/passwords/reset", post(password::send_reset_email))
        .route("/auth/passwordless/email", post(passwordless::send_email))
        .route("/sessions/auth/signin", post(session::signin))
        .route("/sessions/auth/otp/send", post(otp::send))
        .route("/sessions/auth/otp/signin", post(otp::signin))
        .route(
            "/sessions/auth/oauth2/{provider}/signin",
            post(oauth2::signin),
        )
        .route("/sessions/api/keys/signin", post(session::api_key_signin))
        .route(
            "/sessions/csrf-token/refresh",
            post(session::refresh_csrf_token),
        );

    let verify_email_token = Router::new()
        .route("/auth/email/verified", post(email::verified))
        .route_layer(from_fn(require_verify_email_token));

    let access_token = Router::new()
        .route("/auth/email/reset", post(email::send_reset_email))
        .route("/auth/users", post(users::user))
        .route_layer(from_fn(require_access_token));

    let update_token = Router::new()
        .route("/auth/users/update", post(users::update))
        .route_layer(from_fn(require_update_token));

    // Bearer token of any kind; handlers check the kind they need
    let bearer = Router::new()
        .route("/auth/email/update", post(email::update))
        .route("/auth/passwords/update", post(password::update))
        .route("/auth/passwordless/signin", post(passwordless::signin))
        .route("/auth/tokens/info", post(tokens::info))
        .route("/auth/tokens/access", post(tokens::access))
        .route(
            "/sessions/auth/passwordless/validate",
            post(session::passwordless_validate),
        )
        .merge(verify_email_token)
        .merge(access_token)
        .merge(update_token)
        .route_layer(from_fn_with_state(state.clone(), require_token));

    let session_read = Router::new()
        .route("/sessions/info", get(session::info))
        .route("/sessions/user", get(session::user))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let session_write = Router::new()
        .route("/sessions/refresh", post(session::refresh))
        .route("/sessions/signout", post(session::signout))
        .route("/sessions/tokens/create/{type}", post(session::create_token))
        .route("/sessions/user/update", post(session::update_user))
        .route(
            "/sessions/user/passwords/update",
            post(session::update_password),
        )
        .route_layer(from_fn_with_state(state.clone(), require_csrf))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let protected = Router::new()
        .route("/about", get(about::about))
        .route("/admin/roles", get(admin::roles))
        .route("/admin/users", post(admin::users))
        .route("/admin/users/stats", get(admin::user_stats))
        .route("/admin/users/add", post(admin::add_user))
        .route("/admin/users/update", post(admin::update_user))
        .route("/admin/users/delete/{id}", delete(admin::delete_user))
        .route_layer(from_fn_with_state(state.clone(), rbac));

    Router::new()
        .merge(public)
        .merge(bearer)
        .merge(session_read)
        .merge(session_write)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(cors(&state.config.cors_origins)),
        )
        .with_state(state)
}
