//! HTTP server for the Prometheus scrape endpoint.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::listener::cancelled;
use crate::registry::SharedRegistry;
use crate::status::{ListenerState, ListenerStatus};

// prometheus-client encodes every gauge value as a float, so a count of 12
// is exposed as `12.0`. Scrapers parse both forms identically.
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    registry: SharedRegistry,
    status: ListenerStatus,
}

/// Create the HTTP router serving the metrics, health and readiness routes.
pub fn create_router(registry: SharedRegistry, status: ListenerStatus, metrics_path: &str) -> Router {
    let state = AppState { registry, status };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.registry.render() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", OPENMETRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics\n").into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
///
/// Ready only while every topic listener is consuming. A listener that has
/// stopped, even cleanly, leaves its gauges frozen.
async fn ready_handler(State(state): State<AppState>) -> Response {
    if state.status.all_running() {
        return (StatusCode::OK, "ready\n").into_response();
    }

    let stopped: Vec<String> = state
        .status
        .snapshot()
        .into_iter()
        .filter(|(_, listener)| *listener != ListenerState::Running)
        .map(|(topic, listener)| format!("{topic}: {listener}"))
        .collect();

    (
        StatusCode::SERVICE_UNAVAILABLE,
        format!("not ready - {}\n", stopped.join(", ")),
    )
        .into_response()
}

/// HTTP server configuration.
pub struct HttpServer {
    registry: SharedRegistry,
    status: ListenerStatus,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(
        registry: SharedRegistry,
        status: ListenerStatus,
        listen_addr: SocketAddr,
        metrics_path: String,
    ) -> Self {
        Self {
            registry,
            status,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.registry, self.status, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancelled(&mut shutdown).await;
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
