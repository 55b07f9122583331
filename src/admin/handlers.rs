use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::health::HealthStatus;
use crate::streams::{Purpose, ReadinessError, ReadinessResult};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub config_generation: u64,
    pub monitor_running: bool,
    pub in_flight_activations: usize,
    pub active_streams: usize,
}

#[derive(Deserialize)]
pub struct ReadyParams {
    pub purpose: Option<Purpose>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ReadinessFailure(ReadinessError);

impl IntoResponse for ReadinessFailure {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ReadinessError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            ReadinessError::Cancelled { .. } | ReadinessError::Aborted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let status = if state.monitor.is_healthy() { "operational" } else { "degraded" };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        uptime_secs: state.started_at.elapsed().as_secs(),
        config_generation: state.config.generation(),
        monitor_running: state.monitor.is_running(),
        in_flight_activations: state.controller.in_flight_count(),
        active_streams: state.controller.active_count(),
    })
}

pub async fn get_health(State(state): State<AdminState>) -> Json<HealthStatus> {
    Json(state.monitor.health_status())
}

pub async fn post_device_ready(
    State(state): State<AdminState>,
    Path(device): Path<String>,
    Query(params): Query<ReadyParams>,
) -> Result<Json<ReadinessResult>, ReadinessFailure> {
    let purpose = params.purpose.unwrap_or(Purpose::Snapshot);
    state
        .controller
        .ensure_ready(&device, purpose)
        .await
        .map(Json)
        .map_err(ReadinessFailure)
}

pub async fn delete_device_active(State(state): State<AdminState>, Path(device): Path<String>) -> StatusCode {
    if state.controller.mark_inactive(&device) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
