//! HTTP liveness and queue status endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::queue::store::QueueStore;

/// State shared across handlers.
#[derive(Clone)]
pub struct HealthState {
    pub started_at: DateTime<Utc>,
    pub store: Arc<dyn QueueStore>,
}

impl HealthState {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            started_at: Utc::now(),
            store,
        }
    }
}

/// Build the router with `/healthz` and `/status`.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(queue_status))
        .with_state(state)
}

async fn healthz(State(state): State<HealthState>) -> impl IntoResponse {
    let now = Utc::now();
    let uptime = (now - state.started_at).num_seconds().max(0);
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": uptime,
        "timestamp": now.to_rfc3339(),
    }))
}

async fn queue_status(State(state): State<HealthState>) -> impl IntoResponse {
    match state.store.aggregate_status_counts().await {
        Ok(counts) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "pending": counts.pending,
                "running": counts.running,
                "complete": counts.complete,
                "failed": counts.failed,
                "total": counts.total(),
            })),
        ),
        Err(e) => {
            error!(error = %e, "Failed to read queue counts");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "queue unavailable" })),
            )
        }
    }
}

/// Serve `router` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: HealthState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(?addr, "Health server started");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::queue::model::{FormatTag, NewItem};
    use crate::store::LibSqlQueueStore;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let store = Arc::new(LibSqlQueueStore::new_memory().await.unwrap());
        let app = router(HealthState::new(store));

        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_i64().unwrap() >= 0);
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let store = Arc::new(LibSqlQueueStore::new_memory().await.unwrap());
        store
            .enqueue_batch(&[
                NewItem::new("one", FormatTag::Bullet),
                NewItem::new("two", FormatTag::Bullet),
            ])
            .await
            .unwrap();
        store.claim_next_pending().await.unwrap();

        let response = router(HealthState::new(store))
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["pending"], 1);
        assert_eq!(json["running"], 1);
        assert_eq!(json["complete"], 0);
        assert_eq!(json["total"], 2);
    }
}
