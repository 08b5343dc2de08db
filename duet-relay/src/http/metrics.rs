//! Prometheus metrics endpoint.

use crate::notifier::Outbox;
use crate::server::PairRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(
    Extension(relay): Extension<Arc<PairRelay>>,
    Extension(outbox): Extension<Arc<Outbox>>,
) -> impl IntoResponse {
    let m = relay.metrics();

    // Gauges (best effort: zero if the directory is unreachable)
    let counts = relay.directory().count_by_state().await.unwrap_or_default();
    let idle = counts.idle;
    let seeking = counts.seeking;
    let paired = counts.paired;
    let pending = outbox.total_pending();

    // Counters
    let updates = m.updates_total.load(Ordering::Relaxed);
    let seeks = m.seeks_total.load(Ordering::Relaxed);
    let pairings = m.pairings_total.load(Ordering::Relaxed);
    let conflicts = m.match_conflicts_total.load(Ordering::Relaxed);
    let relayed = m.relayed_total.load(Ordering::Relaxed);
    let dropped = m.relay_dropped_total.load(Ordering::Relaxed);
    let teardowns = m.teardowns_total.load(Ordering::Relaxed);
    let notify_failures = m.notify_failures_total.load(Ordering::Relaxed);
    let storage_errors = m.storage_errors_total.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP duet_users Users by pairing state
# TYPE duet_users gauge
duet_users{{state="idle"}} {idle}
duet_users{{state="seeking"}} {seeking}
duet_users{{state="paired"}} {paired}

# HELP duet_outbox_pending Messages waiting for pickup
# TYPE duet_outbox_pending gauge
duet_outbox_pending {pending}

# HELP duet_info Server information
# TYPE duet_info gauge
duet_info{{version="{version}"}} 1

# HELP duet_updates_total Inbound updates received
# TYPE duet_updates_total counter
duet_updates_total {updates}

# HELP duet_seeks_total Seek commands handled
# TYPE duet_seeks_total counter
duet_seeks_total {seeks}

# HELP duet_pairings_total Pairings formed
# TYPE duet_pairings_total counter
duet_pairings_total {pairings}

# HELP duet_match_conflicts_total Binds lost to a concurrent matcher
# TYPE duet_match_conflicts_total counter
duet_match_conflicts_total {conflicts}

# HELP duet_relayed_total Texts delivered to a partner
# TYPE duet_relayed_total counter
duet_relayed_total {relayed}

# HELP duet_relay_dropped_total Texts dropped for lack of a partner
# TYPE duet_relay_dropped_total counter
duet_relay_dropped_total {dropped}

# HELP duet_teardowns_total Sessions or searches ended
# TYPE duet_teardowns_total counter
duet_teardowns_total {teardowns}

# HELP duet_notify_failures_total Outbound deliveries that failed
# TYPE duet_notify_failures_total counter
duet_notify_failures_total {notify_failures}

# HELP duet_storage_errors_total Directory operations that failed
# TYPE duet_storage_errors_total counter
duet_storage_errors_total {storage_errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
