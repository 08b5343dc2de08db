//! Health check endpoint.

use crate::notifier::Outbox;
use crate::server::PairRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status: "ok", or "degraded" when the directory is unreachable.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Users in the waiting pool.
    pub seeking: u64,
    /// Users in a session.
    pub paired: u64,
    /// Messages waiting for pickup.
    pub outbox_pending: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(
    Extension(relay): Extension<Arc<PairRelay>>,
    Extension(outbox): Extension<Arc<Outbox>>,
) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    let (status, counts) = match relay.directory().count_by_state().await {
        Ok(counts) => ("ok", counts),
        Err(e) => {
            tracing::warn!("Health check could not count users: {}", e);
            ("degraded", Default::default())
        }
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        seeking: counts.seeking,
        paired: counts.paired,
        outbox_pending: outbox.total_pending(),
        uptime_seconds: uptime,
    })
}
