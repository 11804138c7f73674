//! HTTP server for status, manual errors and Prometheus metrics.

use crate::metrics::MetricsRegistry;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use prometheus_client::encoding::text::encode;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use systemcheck::{Registry, RegistryError};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub metrics: Arc<MetricsRegistry>,
}

/// Body of `POST /status/:name/errors`
#[derive(Debug, Deserialize)]
pub struct ManualErrorRequest {
    pub message: String,
}

/// Handler failures mapped onto HTTP responses
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { name } => ApiError::NotFound(name),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(name) => (StatusCode::NOT_FOUND, format!("system [{}] is not registered", name)),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// HTTP server for the status API
pub struct StatusServer {
    state: AppState,
    listen_addr: String,
}

impl StatusServer {
    pub fn new(state: AppState, listen_addr: String) -> Self {
        Self { state, listen_addr }
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "Status server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Build the status API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(overall_handler))
        .route("/status/:name", get(system_handler))
        .route("/status/:name/errors", post(manual_error_handler))
        .route("/metrics", get(metrics_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// `GET /status`: 503 while any system is unhealthy
async fn overall_handler(State(state): State<AppState>) -> Response {
    let overall = state.registry.overall_status();
    state.metrics.observe(&overall);

    let status = if overall.unhealthy().next().is_some() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    state
        .metrics
        .record_request("overall", if status == StatusCode::OK { "ok" } else { "unavailable" });

    (status, Json(overall)).into_response()
}

async fn system_handler(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    match state.registry.status(&name) {
        Ok(snapshot) => {
            state.metrics.record_request("system", "ok");
            Ok(Json(snapshot).into_response())
        }
        Err(err) => {
            state.metrics.record_request("system", "not_found");
            Err(err.into())
        }
    }
}

async fn manual_error_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ManualErrorRequest>,
) -> Result<StatusCode, ApiError> {
    if let Err(err) = state.registry.report_manual_error(&name, request.message) {
        state.metrics.record_request("manual_error", "not_found");
        return Err(err.into());
    }

    state.metrics.record_manual_error(&name);
    state.metrics.record_request("manual_error", "ok");
    Ok(StatusCode::ACCEPTED)
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.metrics.observe(&state.registry.overall_status());

    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &state.metrics.registry) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}
