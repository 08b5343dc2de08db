//! Update intake and outbox pickup.

use crate::error::RelayError;
use crate::notifier::{Outbox, QueuedMessage};
use crate::server::PairRelay;
use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use duet_types::{Update, UserId};
use std::sync::Arc;

/// Handle one inbound update.
///
/// The work runs on its own task so a client that disconnects mid-request
/// cannot cancel a directory operation halfway.
pub async fn post_update(
    Extension(relay): Extension<Arc<PairRelay>>,
    Json(update): Json<Update>,
) -> Response {
    let task = tokio::spawn(async move { relay.handle_update(&update).await });

    match task.await {
        Ok(Ok(handled)) => Json(handled).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => {
            tracing::error!("Update task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

/// Drain every message queued for a user.
pub async fn drain_messages(
    Extension(outbox): Extension<Arc<Outbox>>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<QueuedMessage>>, Response> {
    let user: UserId = raw.parse().map_err(|e: duet_types::DuetError| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response()
    })?;
    Ok(Json(outbox.drain(user)))
}

fn error_response(error: RelayError) -> Response {
    let status = match error {
        RelayError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}
