//! Quartermaster logistics service (qm-logistics) - main entry point
//!
//! Tracks who holds what for each guild, how far every project is from its
//! targets, and keeps one live dashboard message per guild in sync.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use qm_common::config::{database_path, resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV};
use qm_common::db::init_database;
use qm_common::events::EventBus;
use qm_common::time::millis_to_duration;
use qm_logistics::services::{DashboardSynchronizer, HttpPublisher, LogPublisher, MessagePublisher};
use qm_logistics::{build_router, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for qm-logistics
#[derive(Parser, Debug)]
#[command(name = "qm-logistics")]
#[command(about = "Distributed inventory and project tracking for guilds")]
#[command(version)]
struct Args {
    /// Folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "QM_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long, env = "QM_BIND_ADDR")]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default(args.config.as_deref());

    let level = &config.log_level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("qm_logistics={level},qm_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Quartermaster logistics (qm-logistics) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &config);
    let db_path = database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let publish_timeout = millis_to_duration(config.publisher.timeout_ms);
    let publisher: Arc<dyn MessagePublisher> = match &config.publisher.gateway_url {
        Some(url) => {
            info!("Dashboards publish through gateway {}", url);
            Arc::new(HttpPublisher::new(url, publish_timeout).context("Failed to build HTTP client")?)
        }
        None => {
            warn!("No publisher gateway configured, dashboards are only logged");
            Arc::new(LogPublisher::new())
        }
    };

    let events = EventBus::new(config.dashboard.event_capacity);
    let dashboard = Arc::new(DashboardSynchronizer::new(pool.clone(), publisher, publish_timeout));
    let worker = dashboard
        .clone()
        .spawn_refresh_worker(&events, millis_to_duration(config.dashboard.refresh_debounce_ms));

    let state = AppState::new(
        pool.clone(),
        events,
        dashboard,
        millis_to_duration(config.dashboard.ack_deadline_ms),
    );
    let app = build_router(state);

    let addr = match args.bind {
        Some(addr) => addr,
        None => config
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", config.bind_addr))?,
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("qm-logistics listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    worker.abort();
    pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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
