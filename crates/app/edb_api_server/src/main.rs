//! EDB auth gateway server binary.
//!
//! Reads configuration from the environment (and `.env`), then serves the
//! `edb_api` router until Ctrl-C.

use std::path::PathBuf;

use clap::Parser;
use edb_api::AppState;
use edb_api::config::ApiConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI arguments. Each falls back to the environment variable of the same
/// meaning read by [`ApiConfig::from_env`].
#[derive(Parser, Debug)]
#[command(name = "edb_api_server", about = "EDB auth gateway server", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// PostgreSQL connection URL. Users are kept in memory without one.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS")]
    max_connections: Option<u32>,

    /// JSON file with access rules.
    #[arg(long, env = "ACCESS_RULES_FILE")]
    access_rules: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut ApiConfig) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if self.database_url.is_some() {
            config.database_url = self.database_url;
        }
        if let Some(max) = self.max_connections {
            config.database_max_connections = max;
        }
        if self.access_rules.is_some() {
            config.access_rules_path = self.access_rules;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,edb_api=debug,edb_core=debug")),
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env()?;
    args.apply(&mut config);

    info!(
        bind_addr = %config.bind_addr,
        database = config.database_url.is_some(),
        max_connections = config.database_max_connections,
        "starting edb_api_server"
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState::from_config(config).await?;
    let app = edb_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "auth gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
