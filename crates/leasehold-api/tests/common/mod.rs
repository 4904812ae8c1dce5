//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use leasehold_core::clock::Clock;
use leasehold_core::memory::InMemoryRecorder;
use leasehold_core::recorder::Recorder;
use leasehold_core::snapshot::SnapshotPolicy;
use leasehold_event_store::PgRecorder;
use leasehold_test_support::FixedClock;
use sqlx::PgPool;
use tower::ServiceExt;

use leasehold_api::build_app;
use leasehold_api::state::AppState;

/// Fixed clock used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// State over a fresh in-memory recorder. Clone it to send several
/// requests against the same data.
pub fn memory_state() -> AppState {
    AppState::new(
        Arc::new(InMemoryRecorder::new()),
        SnapshotPolicy::disabled(),
        fixed_clock(),
    )
}

/// State over a provisioned `PgRecorder`, snapshotting every 2 events.
pub async fn postgres_state(pool: PgPool) -> AppState {
    let recorder = PgRecorder::new(pool);
    recorder.provision().await.unwrap();
    AppState::new(
        Arc::new(recorder) as Arc<dyn Recorder>,
        SnapshotPolicy::every(2),
        fixed_clock(),
    )
}

/// Build the full app router. Uses the same middleware as `main.rs`.
pub fn build_test_app(state: &AppState) -> Router {
    build_app(state.clone())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null);

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a POST request without a body and return the response.
pub async fn post_empty(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Register a unit and return its id.
pub async fn register_unit(state: &AppState, address: &str) -> String {
    let (status, json) = post_json(
        build_test_app(state),
        "/api/v1/units",
        &serde_json::json!({ "address": address, "amenities": ["laundry"] }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_owned()
}

/// Register and approve a tenant and return its id.
pub async fn approved_tenant(state: &AppState, identification_number: &str) -> String {
    let (status, json) = post_json(
        build_test_app(state),
        "/api/v1/tenants",
        &serde_json::json!({
            "identification_number": identification_number,
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@example.com",
            "phone_number": "555-0100",
            "date_of_birth": "1990-12-10",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = json["id"].as_str().unwrap().to_owned();
    let (status, _) =
        post_empty(build_test_app(state), &format!("/api/v1/tenants/{id}/approve")).await;
    assert_eq!(status, StatusCode::OK);
    id
}
