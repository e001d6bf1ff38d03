//! # HTTP Server
//!
//! Liveness, readiness and Prometheus metrics endpoints.
//!
//! - `GET /healthz` - always 200 while the process serves; reports `degraded`
//!   after a fatal reconcile error
//! - `GET /readyz` - 200 once the server is bound and the initial listing has
//!   been queued, 503 before
//! - `GET /metrics` - Prometheus text format

use crate::observability;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Flags shared between the control loop and the probe handlers
#[derive(Debug, Default)]
pub struct ServerState {
    /// Set once the listener is bound
    pub is_ready: AtomicBool,
    /// Set once the startup listing has been enqueued
    pub is_synced: AtomicBool,
    /// Set after a fatal reconcile error
    pub is_degraded: AtomicBool,
}

impl ServerState {
    pub fn mark_synced(&self) {
        self.is_synced.store(true, Ordering::Relaxed);
    }

    pub fn mark_degraded(&self) {
        self.is_degraded.store(true, Ordering::Relaxed);
    }

    pub fn is_degraded(&self) -> bool {
        self.is_degraded.load(Ordering::Relaxed)
    }

    fn accepting_traffic(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed) && self.is_synced.load(Ordering::Relaxed)
    }
}

/// Probe and metrics routes
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `port` and serve until the process exits
///
/// Marks the server ready as soon as the listener is bound.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind HTTP server to port {port}"))?;
    state.is_ready.store(true, Ordering::Relaxed);
    info!(port, "HTTP server listening");

    axum::serve(listener, router(state))
        .await
        .context("HTTP server terminated")
}

async fn healthz(State(state): State<Arc<ServerState>>) -> &'static str {
    if state.is_degraded() {
        "degraded"
    } else {
        "ok"
    }
}

async fn readyz(State(state): State<Arc<ServerState>>) -> (StatusCode, &'static str) {
    if state.accepting_traffic() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics() -> Response {
    match observability::metrics::render_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
