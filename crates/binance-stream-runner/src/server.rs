/*
[INPUT]:  Shared subscription manager, stream metrics, shutdown token
[OUTPUT]: HTTP status endpoints (`/`, `/health`)
[POS]:    Process shell - status server
[UPDATE]: When adding endpoints or changing the health payload
*/

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use binance_stream_adapter::SubscriptionManager;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Environment;
use crate::metrics::{StreamMetrics, StreamMetricsSnapshot};

/// Shared state accessible from axum handlers
#[derive(Debug, Clone)]
pub struct StatusState {
    pub environment: Environment,
    pub manager: Arc<SubscriptionManager>,
    pub metrics: Arc<Mutex<StreamMetrics>>,
    pub started_at: DateTime<Utc>,
}

impl StatusState {
    pub fn new(
        environment: Environment,
        manager: Arc<SubscriptionManager>,
        metrics: Arc<Mutex<StreamMetrics>>,
    ) -> Self {
        Self {
            environment,
            manager,
            metrics,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub session_state: String,
    pub generation: u64,
    pub subscriptions: Vec<String>,
    pub uptime_secs: i64,
    pub metrics: StreamMetricsSnapshot,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/", get(welcome_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    state: StatusState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "status server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

/// GET /
async fn welcome_handler(State(state): State<StatusState>) -> Json<Value> {
    Json(json!({
        "message": "Binance stream runner",
        "environment": state.environment.as_str(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health
async fn health_handler(State(state): State<StatusState>) -> Json<HealthResponse> {
    let session = state.manager.session();
    Json(HealthResponse {
        status: "ok",
        session_state: format!("{:?}", session.state()).to_lowercase(),
        generation: session.generation(),
        subscriptions: state.manager.subscriptions(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        metrics: state.metrics.lock().snapshot(),
    })
}
