//! Local HTTP surface
//!
//! - `GET /api/state`: decorated snapshot pull
//! - `GET /api/stream`: SSE feed, current snapshot first
//! - `GET /api/schema`: JSON Schema of the document
//! - `POST /api/events`: ingest one host notification
//! - `GET /health`: liveness probe

use crate::ingest::{Ingestor, Notification, Outcome};
use crate::models::document_schema;
use crate::monitor::{refresh_blocking, snapshot_blocking, subscribe_blocking, Broadcaster};
use crate::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub broadcaster: Arc<Broadcaster>,
}

impl AppState {
    pub fn new(ingestor: Arc<Ingestor>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            ingestor,
            broadcaster,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/stream", get(stream))
        .route("/api/schema", get(get_schema))
        .route("/api/events", post(post_event))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health_check(State(state): State<AppState>) -> Response {
    let Some(snapshot) = snapshot_blocking(&state.broadcaster).await else {
        return task_failed("snapshot task failed");
    };
    Json(json!({
        "status": "ok",
        "viewers": state.broadcaster.viewer_count(),
        "session_id": snapshot.session_id(),
    }))
    .into_response()
}

async fn get_state(State(state): State<AppState>) -> Response {
    match snapshot_blocking(&state.broadcaster).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => task_failed("snapshot task failed"),
    }
}

async fn get_schema() -> Json<serde_json::Value> {
    Json(document_schema())
}

async fn stream(State(state): State<AppState>) -> Response {
    let Some(subscription) = subscribe_blocking(&state.broadcaster).await else {
        return task_failed("subscribe task failed");
    };
    debug!(viewer = subscription.id(), "stream opened");

    let events = subscription
        .into_stream()
        .map(|payload| Ok::<_, Infallible>(Event::default().data(&*payload)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
    .into_response()
}

async fn post_event(State(state): State<AppState>, body: Bytes) -> Response {
    let raw = String::from_utf8_lossy(&body).into_owned();
    let notification = match Notification::from_hook_json(&raw) {
        Ok(notification) => notification,
        Err(e) => {
            debug!(error = %e, "rejected notification");
            let outcome = Outcome::Ignored {
                reason: e.to_string(),
            };
            return (StatusCode::BAD_REQUEST, Json(outcome)).into_response();
        }
    };

    // Lock acquisition and file IO block
    let ingestor = Arc::clone(&state.ingestor);
    let applied = tokio::task::spawn_blocking(move || ingestor.handle(&notification)).await;

    match applied {
        Ok(outcome) => {
            // Same-process writes need no change signal to reach viewers
            if outcome.is_applied() {
                refresh_blocking(&state.broadcaster, Utc::now()).await;
            }
            (StatusCode::ACCEPTED, Json(outcome)).into_response()
        }
        Err(e) => {
            error!(error = %e, "ingest task failed");
            task_failed("ingest task failed")
        }
    }
}

fn task_failed(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}
