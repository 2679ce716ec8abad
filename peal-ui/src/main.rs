//! peal-ui - attendance tracker web server
//!
//! Loads configuration, opens the configured storage backend once, and
//! serves the server-rendered pages until Ctrl+C or SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use peal_common::auth::{SessionStore, SharedSecret};
use peal_common::config::Config;
use peal_common::open_storage;
use peal_ui::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for peal-ui
#[derive(Parser, Debug)]
#[command(name = "peal-ui")]
#[command(about = "Attendance tracker for practices, touches and bells")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and environment)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides config and environment)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so logging.level can seed the filter
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("peal_ui={level},peal_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting peal-ui v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("Invalid configuration")?;
    let password = config
        .auth
        .password
        .as_ref()
        .context("No login password configured")?;
    let secret = SharedSecret::new(password.expose());

    let storage = open_storage(&config.storage)
        .await
        .context("Failed to open storage backend")?;

    let sessions = SessionStore::with_ttl(config.auth.session_ttl());
    let state = AppState::with_sessions(storage, secret, sessions);
    let app = build_router(state);

    let listener =
        tokio::net::TcpListener::bind((config.server.bind.as_str(), config.server.port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind to {}:{}",
                    config.server.bind, config.server.port
                )
            })?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    info!("peal-ui listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
