//! HTTP endpoints for duet-relay.
//!
//! The messaging transport posts raw updates here and collects each user's
//! outbound messages. Health and metrics endpoints sit alongside.

pub mod health;
mod metrics;
mod updates;

use crate::notifier::Outbox;
use crate::server::PairRelay;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<PairRelay>, outbox: Arc<Outbox>) -> Router {
    let mut router = Router::new()
        .route("/updates", post(updates::post_update))
        .route("/users/:id/messages", get(updates::drain_messages))
        .route("/health", get(health::health_handler));

    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay)).layer(Extension(outbox))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::{MemoryDirectory, SqliteDirectory};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use duet_types::UserId;
    use tower::util::ServiceExt;

    fn test_app(config: Config) -> (Router, Arc<PairRelay>, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::new(config.outbox.max_queued));
        let relay = Arc::new(PairRelay::new(
            config,
            Arc::new(MemoryDirectory::new()),
            outbox.clone(),
        ));
        (build_router(relay.clone(), outbox.clone()), relay, outbox)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (app, _, _) = test_app(Config::default());
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["seeking"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let (app, _, _) = test_app(Config::default());
        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_can_be_disabled() {
        let mut config = Config::default();
        config.http.metrics_enabled = false;
        let (app, _, _) = test_app(config);
        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_update_queues_welcome() {
        let (app, _, outbox) = test_app(Config::default());
        let response = app
            .clone()
            .oneshot(post_json(
                "/updates",
                serde_json::json!({
                    "chat_id": 5,
                    "message_id": 1,
                    "text": "/start",
                    "profile": {"first_name": "Ada"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["command"], "start");
        assert_eq!(outbox.pending(UserId::new(5)), 1);

        let response = app.oneshot(get("/users/5/messages")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let messages = body_json(response).await;
        assert_eq!(messages.as_array().unwrap().len(), 1);
        assert!(messages[0]["text"].as_str().unwrap().contains("Ada"));
        assert_eq!(messages[0]["reply_to"], 1);
        assert_eq!(outbox.pending(UserId::new(5)), 0);
    }

    #[tokio::test]
    async fn pairing_over_http() {
        let (app, relay, outbox) = test_app(Config::default());
        let seek = relay.replies().keys().random_connect.clone();
        for id in [1, 2] {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/updates",
                    serde_json::json!({"chat_id": id, "text": seek}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app
            .clone()
            .oneshot(post_json("/updates", serde_json::json!({"chat_id": 2, "text": "hey"})))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["command"], "text");
        assert_eq!(json["result"]["outcome"], "delivered");

        let texts: Vec<String> = outbox
            .drain(UserId::new(1))
            .into_iter()
            .map(|m| m.message.text)
            .collect();
        assert_eq!(texts.last().map(String::as_str), Some("hey"));
    }

    #[tokio::test]
    async fn non_numeric_user_id_is_rejected() {
        let (app, _, _) = test_app(Config::default());
        let response = app.oneshot(get("/users/alice/messages")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response)
            .await["error"]
            .as_str()
            .unwrap()
            .contains("alice"));
    }

    #[tokio::test]
    async fn malformed_update_is_rejected() {
        let (app, _, _) = test_app(Config::default());
        let response = app
            .oneshot(post_json("/updates", serde_json::json!({"text": "no chat"})))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn storage_failure_maps_to_503() {
        let config = Config::default();
        let outbox = Arc::new(Outbox::new(config.outbox.max_queued));
        let directory = SqliteDirectory::in_memory().await.unwrap();
        directory.close().await;
        let relay = Arc::new(PairRelay::new(config, Arc::new(directory), outbox.clone()));
        let app = build_router(relay, outbox);

        let response = app
            .oneshot(post_json(
                "/updates",
                serde_json::json!({"chat_id": 1, "text": "/start"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_json(response).await["error"].is_string());
    }
}
