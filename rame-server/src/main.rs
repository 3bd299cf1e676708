//! rame-server - media library backend
//!
//! Serves storage, directory and playlist lists over HTTP, scans media
//! metadata in the background and answers playback/cluster status polls.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rame_common::config::{self, StorageConfig};
use rame_common::events::EventBus;
use rame_server::probe::LoftyProbe;
use rame_server::storage::StorageRegistry;
use rame_server::{AppState, Library, LibrarySettings};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rame-server
#[derive(Parser, Debug)]
#[command(name = "rame-server")]
#[command(about = "Media library backend: lists, background scanning and status")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "RAME_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the database
    #[arg(short, long, env = "RAME_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "RAME_PORT")]
    port: Option<u16>,

    /// Extra storage as name=/path (repeatable)
    #[arg(short, long = "storage", value_name = "NAME=PATH")]
    storages: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = config::resolve_config_path(args.config.as_deref());
    let mut toml_config = config::load_toml_config(&config_path);
    for value in &args.storages {
        let storage = StorageConfig::parse_cli(value)
            .with_context(|| format!("Invalid --storage argument '{}'", value))?;
        toml_config.upsert_storage(storage);
    }
    if let Some(port) = args.port {
        toml_config.port = port;
    }

    let level = toml_config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rame_server={level},rame_common={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting rame-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );
    info!("Config file: {}", config_path.display());

    toml_config
        .validate()
        .context("Invalid configuration")?;

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = config::database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let pool = rame_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    if toml_config.storages.is_empty() {
        warn!("No storages configured; only playlists will be available");
    }
    for storage in &toml_config.storages {
        info!(storage = %storage.name, path = %storage.path.display(), "Storage configured");
    }

    let event_bus = EventBus::new(256);
    let settings = LibrarySettings::from_config(&toml_config);
    info!(
        node = %settings.node_name,
        concurrency = settings.scan.concurrency,
        reprobe = ?settings.scan.reprobe,
        "Library settings"
    );

    // Blocking tag reads are bounded across all scan jobs
    let probe = Arc::new(LoftyProbe::new(settings.scan.concurrency));
    let library = Library::new(
        settings,
        StorageRegistry::from_config(&toml_config.storages),
        probe,
        event_bus,
        Some(pool),
    )
    .await
    .context("Failed to initialize library")?;

    let app = rame_server::build_router(AppState::new(Arc::new(library)));

    let addr: SocketAddr = format!("{}:{}", toml_config.bind, toml_config.port)
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", toml_config.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
