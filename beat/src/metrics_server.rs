//! HTTP server for Prometheus metrics and health
//!
//! # Endpoints
//!
//! - `GET /metrics` - Prometheus metrics
//! - `GET /health` - poller state as JSON; 503 once shutdown has begun

use crate::state::{PollerState, StateCell};
use axum::extract::State;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared state for the metrics server
#[derive(Clone)]
struct AppState {
    poller: Option<Arc<StateCell>>,
}

/// Metrics HTTP server
pub struct MetricsServer;

impl MetricsServer {
    /// Start the metrics server on `addr`
    ///
    /// Runs until the returned handle is aborted or the process exits.
    pub fn start(addr: SocketAddr, poller: Option<Arc<StateCell>>) -> JoinHandle<()> {
        let state = AppState { poller };

        tokio::spawn(async move {
            let app = Router::new()
                .route("/metrics", get(metrics_handler))
                .route("/health", get(health_handler))
                .with_state(state);

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, %addr, "failed to bind metrics server");
                    return;
                }
            };
            info!(%addr, "metrics server listening");

            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "metrics server error");
            }
        })
    }
}

async fn metrics_handler() -> impl IntoResponse {
    let body = crate::metrics::gather();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[derive(serde::Serialize)]
struct HealthSummary {
    status: &'static str,
    poller_state: Option<&'static str>,
    output_healthy: Option<bool>,
}

async fn health_handler(State(app): State<AppState>) -> impl IntoResponse {
    let poller_state = app.poller.as_ref().map(|cell| cell.get());
    let output_healthy = crate::metrics::Metrics::get().map(|m| m.output_health.get() >= 1.0);

    let status = match poller_state {
        Some(PollerState::Stopping | PollerState::Stopped) => "stopping",
        _ if output_healthy == Some(false) => "degraded",
        _ => "healthy",
    };
    let code = match status {
        "stopping" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    let summary = HealthSummary {
        status,
        poller_state: poller_state.map(|s| s.as_str()),
        output_healthy,
    };
    (code, Json(summary)).into_response()
}
