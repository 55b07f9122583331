//! Operator HTTP API.
//!
//! Every route requires the bearer API key from `admin.api_key`.
//!
//! - `GET /admin/status`: version, uptime, config generation, activity
//! - `GET /admin/health`: MediaMTX health and circuit state
//! - `POST /admin/devices/{device}/ready?purpose=`: run a readiness check
//! - `DELETE /admin/devices/{device}/active`: drop a device from the active cache

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::LiveConfig;
use crate::health::HealthMonitor;
use crate::streams::StreamReadinessController;

#[derive(Clone)]
pub struct AdminState {
    pub config: LiveConfig,
    pub monitor: Arc<HealthMonitor>,
    pub controller: StreamReadinessController,
    pub started_at: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/health", get(get_health))
        .route("/admin/devices/{device}/ready", post(post_device_ready))
        .route("/admin/devices/{device}/active", delete(delete_device_active))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Admin API shutting down");
        })
        .await
}
