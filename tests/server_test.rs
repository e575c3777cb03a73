//! Integration tests for the local HTTP surface
//!
//! Tests verify:
//! - `/health`, `/api/state`, `/api/schema` respond with JSON
//! - Served snapshots validate against the served schema
//! - `POST /api/events` applies or rejects host payloads
//! - `/api/stream` opens with the current snapshot

use agent_monitor::ingest::{Ingestor, Notification};
use agent_monitor::monitor::Broadcaster;
use agent_monitor::server::{router, AppState};
use agent_monitor::store::StateStore;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestServer {
    _temp: TempDir,
    ingestor: Arc<Ingestor>,
    broadcaster: Arc<Broadcaster>,
}

impl TestServer {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(StateStore::new(temp.path().join("state.json")));
        let ingestor = Arc::new(Ingestor::new(Arc::clone(&store)));
        let broadcaster = Arc::new(Broadcaster::new(store));
        Self {
            _temp: temp,
            ingestor,
            broadcaster,
        }
    }

    fn app(&self) -> Router {
        router(AppState::new(
            Arc::clone(&self.ingestor),
            Arc::clone(&self.broadcaster),
        ))
    }
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_event(app: Router, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/events")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::new();
        server
            .ingestor
            .apply(&Notification::session_start("s-health"))
            .unwrap();

        let (status, body) = get_json(server.app(), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["viewers"], 0);
        assert_eq!(body["session_id"], "s-health");
    }

    #[tokio::test]
    async fn test_state_before_any_write() {
        let server = TestServer::new();

        let (status, body) = get_json(server.app(), "/api/state").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agents"], serde_json::json!({}));
        assert_eq!(body["stats"]["total"], 0);
    }

    #[tokio::test]
    async fn test_state_validates_against_schema() {
        let server = TestServer::new();
        server.ingestor.apply(&Notification::session_start("s1")).unwrap();
        server
            .ingestor
            .apply(&Notification::create("A").with_description("Explore"))
            .unwrap();
        server.ingestor.apply(&Notification::start("A", "Bash")).unwrap();
        server.ingestor.apply(&Notification::start("B", "mcp__db__query")).unwrap();
        server.ingestor.apply(&Notification::error("B")).unwrap();

        let (_, schema) = get_json(server.app(), "/api/schema").await;
        let (_, state) = get_json(server.app(), "/api/state").await;

        let validator = jsonschema::validator_for(&schema).unwrap();
        assert!(validator.is_valid(&state));
        assert_eq!(state["agents"]["B"]["type"], "mcp-call");
        assert_eq!(state["stats"]["error"], 1);
    }

    #[tokio::test]
    async fn test_post_event_applies() {
        let server = TestServer::new();

        let (status, body) = post_event(
            server.app(),
            r#"{"hook_event_name": "PreToolUse", "agent_id": "A", "tool_name": "Grep", "tool_input": {"pattern": "fn main"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "applied");
        assert_eq!(body["kind"], "start");
        assert_eq!(body["agents"], serde_json::json!(["A"]));

        let (_, state) = get_json(server.app(), "/api/state").await;
        assert_eq!(state["agents"]["A"]["state"], "working");
        assert_eq!(state["agents"]["A"]["last_tool"], "grep fn main");
    }

    #[tokio::test]
    async fn test_post_malformed_event_is_rejected() {
        let server = TestServer::new();

        let (status, body) = post_event(server.app(), "{\"tool_name\": ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "ignored");

        let (status, _) = post_event(server.app(), r#"{"tool_name": "Read"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, state) = get_json(server.app(), "/api/state").await;
        assert_eq!(state["stats"]["total"], 0);
    }

    #[tokio::test]
    async fn test_stream_opens_with_snapshot() {
        let server = TestServer::new();
        server.ingestor.apply(&Notification::start("A", "Read")).unwrap();

        let response = server
            .app()
            .oneshot(Request::builder().uri("/api/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let mut body = response.into_body().into_data_stream();
        let frame = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();

        let data = text.strip_prefix("data: ").unwrap().trim_end();
        let snapshot: Value = serde_json::from_str(data).unwrap();
        assert_eq!(snapshot["agents"]["A"]["state"], "working");
        assert_eq!(server.broadcaster.viewer_count(), 1);
    }

    #[tokio::test]
    async fn test_post_event_reaches_stream() {
        let server = TestServer::new();
        let response = server
            .app()
            .oneshot(Request::builder().uri("/api/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();
        body.next().await.unwrap().unwrap();

        let (status, _) = post_event(server.app(), r#"{"kind": "create", "agent_id": "late"}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let frame = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.contains("\"late\""));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let server = TestServer::new();
        let response = server
            .app()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
