//! duet relay binary entry point.
//!
//! Usage:
//! ```bash
//! duet --config duet.toml
//! ```

use anyhow::Context;
use duet_relay::cleanup::spawn_cleanup_task;
use duet_relay::config::{Backend, Config};
use duet_relay::http::{build_router, health::init_start_time};
use duet_relay::notifier::Outbox;
use duet_relay::storage::{Directory, MemoryDirectory, SqliteDirectory};
use duet_relay::PairRelay;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    config.validate()?;

    let directory: Arc<dyn Directory> = match config.storage.backend {
        Backend::Memory => {
            tracing::warn!("Using in-memory directory; pairings are lost on restart");
            Arc::new(MemoryDirectory::new())
        }
        Backend::Sqlite => {
            let sqlite = SqliteDirectory::new(&config.storage)
                .await
                .with_context(|| format!("opening {}", config.storage.database.display()))?;
            tracing::info!("Directory at {}", config.storage.database.display());
            Arc::new(sqlite)
        }
    };

    let outbox = Arc::new(Outbox::new(config.outbox.max_queued));
    let bind_address = config.http.bind_address.clone();
    let cleanup = config.cleanup.clone();
    let relay = Arc::new(PairRelay::new(config, directory, outbox.clone()));

    init_start_time();
    let cleanup_handle = spawn_cleanup_task(outbox.clone(), cleanup);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    tracing::info!("duet v{} listening on {}", env!("CARGO_PKG_VERSION"), bind_address);

    axum::serve(listener, build_router(relay, outbox))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup_handle.abort();
    tracing::info!("Shut down");
    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    let path = get_config_path();
    if path.exists() {
        tracing::info!("Loading configuration from {}", path.display());
        Ok(Config::from_file(&path)?)
    } else {
        tracing::info!("No configuration at {}; using defaults", path.display());
        Ok(Config::default())
    }
}

fn get_config_path() -> PathBuf {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("duet.toml"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
