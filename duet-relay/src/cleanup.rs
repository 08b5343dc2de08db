//! Background cleanup task for uncollected outbox messages.
//!
//! Runs periodically to drop messages nobody picked up within the TTL.

use crate::config::CleanupConfig;
use crate::notifier::Outbox;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Spawn a background cleanup task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_task(
    outbox: Arc<Outbox>,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Cleanup task disabled");
            return;
        }

        let interval_secs = config.interval_secs;
        tracing::info!(
            "Cleanup task started (interval: {}s, ttl: {}s)",
            interval_secs,
            config.outbox_ttl_secs
        );

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;

            let dropped = outbox.expire_older_than(config.outbox_ttl_secs);
            if dropped > 0 {
                tracing::info!("Cleanup: dropped {} uncollected messages", dropped);
            } else {
                tracing::debug!("Cleanup: nothing expired");
            }
        }
    })
}
