//! SKM admissions API server.
//!
//! Usage:
//!   cargo run --bin create_admin      # provision the admin identity
//!   cargo run --bin skm_admissions    # start server (JWT_SECRET must be set)

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use skm_admissions::auth::TokenKeys;
use skm_admissions::config::AppConfig;
use skm_admissions::logging;
use skm_admissions::rest::{create_router, AppState};
use skm_admissions::storage::Storage;

#[derive(Parser)]
#[command(name = "skm_admissions")]
#[command(about = "Admissions REST API", long_about = None)]
struct Args {
    /// Listen address, overrides BIND_ADDR/PORT
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Sled data directory, overrides DATA_DIR
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    let _log_guard = logging::init(&config.log);
    tracing::info!(?config, "starting admissions API");

    let storage = Storage::open(&config.data_dir)?;
    let keys = Arc::new(TokenKeys::new(config.jwt_secret.as_bytes(), config.token_ttl_secs));
    let state = AppState::new(storage.clone(), keys, config.bcrypt_cost)?;
    let app = create_router(state, &config.cors_allowed_origins);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.flush().await?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await
}

/// Resolves once `signal` fires. If the signal handler could not be
/// installed this never resolves and the server runs until killed.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for ctrl-c, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}
