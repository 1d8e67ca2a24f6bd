//! Runtime control API.
//!
//! A small HTTP surface for operating a running generator: liveness,
//! structured status, spike activation and live log-level changes. All
//! handlers act on shared state; none of them can pause or reorder the
//! tick loop.

use crate::engine::EngineHandle;
use crate::export::ServerError;
use crate::monitor::{SelfMonitor, StatusSnapshot};
use crate::spike::{validate_request, SpikeController, SpikeRequestError};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Handle for swapping the active log filter at runtime.
pub type LogReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Shared state behind every control handler.
pub struct ControlContext {
    pub spikes: Arc<SpikeController>,
    pub monitor: Arc<SelfMonitor>,
    pub engine: EngineHandle,
    /// Metric base names that accept spikes.
    pub metrics: BTreeSet<String>,
    /// Absent when logging was initialized without reload support.
    pub log_reload: Option<LogReloadHandle>,
}

/// Body of POST /control/spike.
#[derive(Debug, Clone, Deserialize)]
pub struct SpikeRequest {
    pub metric: String,
    pub multiplier: f64,
    pub duration_s: f64,
}

/// Body of POST /control/loglevel.
#[derive(Debug, Clone, Deserialize)]
pub struct LogLevelRequest {
    pub level: String,
}

#[derive(Debug, Serialize)]
struct SpikeStatus {
    metric: String,
    multiplier: f64,
    remaining_s: f64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    engine_state: String,
    #[serde(flatten)]
    snapshot: StatusSnapshot,
    active_spikes: Vec<SpikeStatus>,
}

/// Serves the control API until shut down.
pub async fn serve_control(port: u16, context: Arc<ControlContext>) -> Result<(), ServerError> {
    let app = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/status", get(status_handler))
        .route("/control/spike", post(spike_handler))
        .route("/control/loglevel", post(loglevel_handler))
        .with_state(context);

    let bind_addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tracing::info!(addr = %bind_addr, "control server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Server(e.to_string()))?;

    Ok(())
}

/// Validates and installs a spike. Shared by the HTTP handler and tests.
fn apply_spike(
    context: &ControlContext,
    request: &SpikeRequest,
) -> Result<Duration, SpikeRequestError> {
    if !context.metrics.contains(&request.metric) {
        return Err(SpikeRequestError::UnknownMetric(request.metric.clone()));
    }
    let duration = validate_request(request.multiplier, request.duration_s)?;
    context
        .spikes
        .activate(&request.metric, request.multiplier, duration);
    Ok(duration)
}

fn spike_error_status(error: &SpikeRequestError) -> StatusCode {
    match error {
        SpikeRequestError::UnknownMetric(_) => StatusCode::NOT_FOUND,
        SpikeRequestError::InvalidMultiplier(_) | SpikeRequestError::InvalidDuration(_) => {
            StatusCode::BAD_REQUEST
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status_handler(State(context): State<Arc<ControlContext>>) -> impl IntoResponse {
    let active_spikes = context
        .spikes
        .snapshot(Instant::now())
        .into_iter()
        .map(|s| SpikeStatus {
            metric: s.metric,
            multiplier: s.multiplier,
            remaining_s: s.remaining_s,
        })
        .collect();

    Json(StatusResponse {
        engine_state: context.engine.state().to_string(),
        snapshot: context.monitor.status(),
        active_spikes,
    })
}

async fn spike_handler(
    State(context): State<Arc<ControlContext>>,
    Json(request): Json<SpikeRequest>,
) -> impl IntoResponse {
    match apply_spike(&context, &request) {
        Ok(duration) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "metric": request.metric,
                "multiplier": request.multiplier,
                "duration_s": duration.as_secs_f64(),
            })),
        ),
        Err(e) => (
            spike_error_status(&e),
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

async fn loglevel_handler(
    State(context): State<Arc<ControlContext>>,
    Json(request): Json<LogLevelRequest>,
) -> impl IntoResponse {
    let Some(handle) = context.log_reload.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "log level reload is not available" })),
        );
    };

    let filter = match EnvFilter::try_new(&request.level) {
        Ok(filter) => filter,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("invalid log level '{}': {}", request.level, e),
                })),
            );
        }
    };

    match handle.reload(filter) {
        Ok(()) => {
            tracing::info!(level = %request.level, "log level changed");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "ok", "level": request.level })),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}
