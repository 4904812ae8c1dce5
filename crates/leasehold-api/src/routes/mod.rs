//! Route modules organized by resource.

pub mod health;
pub mod leases;
pub mod notifications;
pub mod tenants;
pub mod units;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use leasehold_rentals::application::command_handlers::CommandOutcome;

use crate::state::AppState;

/// Returns the full application router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/units", units::router())
        .nest("/api/v1/tenants", tenants::router())
        .nest("/api/v1/leases", leases::router())
        .nest("/api/v1/notifications", notifications::router())
}

/// 201 with the outcome of a command that created an aggregate.
pub(crate) fn created(outcome: CommandOutcome) -> Response {
    (StatusCode::CREATED, Json(outcome)).into_response()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use leasehold_core::memory::InMemoryRecorder;
    use leasehold_core::recorder::Recorder;
    use leasehold_core::snapshot::SnapshotPolicy;
    use leasehold_test_support::{FailingRecorder, FixedClock};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::state::AppState;

    pub(crate) fn state_with(recorder: Arc<dyn Recorder>) -> AppState {
        AppState::new(
            recorder,
            SnapshotPolicy::disabled(),
            Arc::new(FixedClock::on(2026, 1, 15)),
        )
    }

    pub(crate) fn state_with_policy(policy: SnapshotPolicy) -> AppState {
        AppState::new(
            Arc::new(InMemoryRecorder::new()),
            policy,
            Arc::new(FixedClock::on(2026, 1, 15)),
        )
    }

    pub(crate) fn memory_state() -> AppState {
        state_with(Arc::new(InMemoryRecorder::new()))
    }

    pub(crate) fn failing_state() -> AppState {
        state_with(Arc::new(FailingRecorder::unavailable()))
    }

    /// Sends one request and returns the status and the JSON body, or
    /// `Value::Null` when the body is not JSON.
    pub(crate) async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<&Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        (status, json)
    }
}
