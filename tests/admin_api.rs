//! Admin API routes through the full router, auth included.

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::time::Instant;
use tower::ServiceExt;

use camera_service::admin::{setup_admin_router, AdminState};
use camera_service::config::LiveConfig;
use camera_service::health::HealthMonitor;
use camera_service::streams::StreamReadinessController;
use common::{breaker_for, test_config, FakeLifecycle, FakeProbe, PathBehavior};

const KEY: &str = "test-admin-key";

fn router(path: PathBehavior) -> Router {
    let mut config = test_config();
    config.admin.api_key = KEY.to_string();
    let breaker = breaker_for(&config);
    let live = LiveConfig::new(config);

    let monitor = HealthMonitor::new(Arc::new(FakeProbe::always(true)), breaker.clone(), live.clone(), None);
    let controller = StreamReadinessController::new(Arc::new(FakeLifecycle::new(path)), breaker, live.clone(), None);

    setup_admin_router(AdminState {
        config: live,
        monitor: Arc::new(monitor),
        controller,
        started_at: Instant::now(),
    })
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {KEY}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_missing_key_rejected() {
    let response = router(PathBehavior::AlreadyReady)
        .oneshot(Request::builder().uri("/admin/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_key_rejected() {
    let response = router(PathBehavior::AlreadyReady)
        .oneshot(
            Request::builder()
                .uri("/admin/health")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_reports_activity() {
    let response = router(PathBehavior::AlreadyReady)
        .oneshot(request(Method::GET, "/admin/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "operational");
    assert_eq!(body["monitor_running"], false);
    assert_eq!(body["in_flight_activations"], 0);
    assert_eq!(body["active_streams"], 0);
}

#[tokio::test]
async fn test_health_reports_closed_circuit() {
    let response = router(PathBehavior::AlreadyReady)
        .oneshot(request(Method::GET, "/admin/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["healthy"], true);
    assert_eq!(body["circuit_state"], "closed");
    assert_eq!(body["consecutive_failures"], 0);
}

#[tokio::test]
async fn test_ready_returns_result() {
    let response = router(PathBehavior::AlreadyReady)
        .oneshot(request(Method::POST, "/admin/devices/%2Fdev%2Fvideo0/ready?purpose=recording"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "immediate");
    assert_eq!(body["tier_reached"], 2);
    assert_eq!(body["fallback_applied"], false);
    assert!(body["elapsed_ms"].is_u64());
}

#[tokio::test]
async fn test_ready_rejects_unknown_purpose() {
    let response = router(PathBehavior::AlreadyReady)
        .oneshot(request(Method::POST, "/admin/devices/cam0/ready?purpose=streaming"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deactivate_unknown_device_is_not_found() {
    let response = router(PathBehavior::AlreadyReady)
        .oneshot(request(Method::DELETE, "/admin/devices/cam0/active"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deactivate_after_ready() {
    let app = router(PathBehavior::AlreadyReady);

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/admin/devices/cam0/ready"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(request(Method::DELETE, "/admin/devices/cam0/active")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
