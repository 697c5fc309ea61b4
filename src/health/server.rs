//! HTTP health surface — accept loop and route handlers.
//!
//! A minimal request/response boundary for external monitors: full health,
//! simple status, metrics, and diagnostics, each independently toggleable.
//! Every response carries a correlation id and uniform security headers, and
//! every request is timed into the shared HTTP counters. The `/health` status
//! code mirrors aggregate health so load balancers can act on it without
//! parsing the body.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::credentials::{material, CredentialRecoveryManager};
use crate::health::{HealthAggregator, ServiceStatus};
use crate::metrics::{resident_memory_bytes, BridgeMetrics};
use crate::types::{BridgeError, CorrelationId, CredentialConfig, HealthServerConfig, Result};

const SERVER_NAME: &str = "ga4-bridge";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    aggregator: Arc<HealthAggregator>,
    recovery: Arc<Mutex<CredentialRecoveryManager>>,
    metrics: Arc<BridgeMetrics>,
    config: Arc<HealthServerConfig>,
    credential_config: Arc<CredentialConfig>,
}

/// Health endpoint server wrapping the aggregator.
#[derive(Debug)]
pub struct HealthServer {
    state: AppState,
    cancel: CancellationToken,
}

impl HealthServer {
    pub fn new(
        aggregator: Arc<HealthAggregator>,
        recovery: Arc<Mutex<CredentialRecoveryManager>>,
        metrics: Arc<BridgeMetrics>,
        config: HealthServerConfig,
        credential_config: CredentialConfig,
    ) -> Self {
        Self {
            state: AppState {
                aggregator,
                recovery,
                metrics,
                config: Arc::new(config),
                credential_config: Arc::new(credential_config),
            },
            cancel: CancellationToken::new(),
        }
    }

    /// Build the router. Exposed so tests can drive handlers directly.
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        Router::new()
            .route("/health", get(health))
            .route("/status", get(status))
            .route("/metrics", get(metrics))
            .route("/diagnostics", get(diagnostics))
            .route("/ping", get(ping))
            .route("/", get(root))
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(
                state.clone(),
                finalize_response,
            ))
            .with_state(state)
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.state.config.bind_addr.clone();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            BridgeError::initialization(format!("failed to bind health server on {addr}: {e}"))
        })?;
        self.serve_on(listener).await
    }

    /// Serve on a pre-bound listener (tests bind port 0 themselves).
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                "health server listening on {addr} (metrics={}, diagnostics={})",
                self.state.config.enable_metrics,
                self.state.config.enable_diagnostics,
            );
        }
        let cancel = self.cancel.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| BridgeError::internal(format!("health server failed: {e}")))?;
        tracing::info!("health server stopped");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Stamp correlation and security headers, record request timing.
async fn finalize_response(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(req).await;

    let correlation_id = CorrelationId::new();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        headers.insert("x-correlation-id", value);
    }
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert("cache-control", HeaderValue::from_static("no-store"));

    state
        .metrics
        .http
        .record(response.status().as_u16(), started.elapsed());
    response
}

async fn health(State(state): State<AppState>) -> Response {
    let health = state.aggregator.perform_health_check().await;
    let status_code = if health.status == ServiceStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = json!({
        "status": health.status,
        "timestamp": health.timestamp,
        "uptime": health.uptime_ms,
        "version": VERSION,
        "checks": health.checks,
        "phase3Features": health.feature_availability,
    });
    (status_code, Json(body)).into_response()
}

async fn status(State(state): State<AppState>) -> Response {
    let simple = state.aggregator.simple_status();
    Json(json!({
        "status": if simple.ok { "ok" } else { "error" },
        "timestamp": Utc::now(),
        "uptime": simple.uptime_ms,
        "server": SERVER_NAME,
        "version": VERSION,
    }))
    .into_response()
}

async fn metrics(State(state): State<AppState>) -> Response {
    if !state.config.enable_metrics {
        return not_found().await.into_response();
    }

    let simple = state.aggregator.simple_status();
    let found = material::discover(&state.credential_config);
    let (validation_count, recovery_attempts) = {
        let recovery = state.recovery.lock().await;
        (recovery.validation_count(), recovery.recovery_attempts())
    };

    Json(json!({
        "uptime": simple.uptime_ms,
        "http": state.metrics.http.snapshot(),
        "validation": state.metrics.validation.snapshot(),
        "auth": {
            "credential_kind": found.kind,
            "validation_count": validation_count,
            "recovery_attempts": recovery_attempts,
        },
        "memory": {
            "rss_bytes": resident_memory_bytes(),
        },
        "runtime": {
            "service": SERVER_NAME,
            "version": VERSION,
            "pid": std::process::id(),
        },
    }))
    .into_response()
}

async fn diagnostics(State(state): State<AppState>) -> Response {
    if !state.config.enable_diagnostics {
        return not_found().await.into_response();
    }

    let credentials = {
        let recovery = state.recovery.lock().await;
        recovery.diagnostics().await
    };

    Json(json!({
        "credentials": credentials,
        "last_health": state.aggregator.last_snapshot(),
    }))
    .into_response()
}

async fn ping() -> Response {
    Json(json!({ "pong": true, "timestamp": Utc::now() })).into_response()
}

async fn root() -> Response {
    Json(json!({
        "service": SERVER_NAME,
        "version": VERSION,
        "endpoints": ["/health", "/status", "/metrics", "/diagnostics", "/ping"],
    }))
    .into_response()
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
