//! Routes for leases.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use leasehold_core::clock::Clock;
use leasehold_rentals::application::command_handlers::{self, CommandOutcome};
use leasehold_rentals::application::query_handlers::{self, LeaseFilter, LeaseView};
use leasehold_rentals::domain::commands;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use super::created;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct DraftLeaseRequest {
    /// Identifier to use; generated when absent.
    pub lease_id: Option<Uuid>,
    /// The unit being leased.
    pub unit_id: Uuid,
    /// Tenants on the lease.
    #[serde(default)]
    pub tenant_ids: Vec<Uuid>,
    /// First day of the lease.
    pub start_date: NaiveDate,
    /// Last day of the lease.
    pub end_date: NaiveDate,
}

/// Request body for POST /{id}/tenants.
#[derive(Debug, Deserialize)]
pub struct AddTenantRequest {
    /// The tenant to add.
    pub tenant_id: Uuid,
}

/// Request body for POST /{id}/dates.
#[derive(Debug, Deserialize)]
pub struct UpdateDatesRequest {
    /// New first day, if changing.
    pub start_date: Option<NaiveDate>,
    /// New last day, if changing.
    pub end_date: Option<NaiveDate>,
}

/// Query parameters for GET /.
#[derive(Debug, Default, Deserialize)]
pub struct ListLeasesQuery {
    /// Only leases on this unit.
    pub unit_id: Option<Uuid>,
    /// Only leases naming this tenant.
    pub tenant_id: Option<Uuid>,
}

/// POST /
#[instrument(skip(state, request))]
async fn draft_lease(
    State(state): State<AppState>,
    Json(request): Json<DraftLeaseRequest>,
) -> Result<Response, ApiError> {
    let command = commands::DraftLease {
        correlation_id: Uuid::new_v4(),
        lease_id: request.lease_id.unwrap_or_else(Uuid::new_v4),
        unit_id: request.unit_id,
        tenant_ids: request.tenant_ids,
        start_date: request.start_date,
        end_date: request.end_date,
    };
    let outcome =
        command_handlers::handle_draft_lease(&command, state.clock.as_ref(), &state.repos).await?;
    Ok(created(outcome))
}

/// GET /
#[instrument(skip(state))]
async fn list_leases(
    State(state): State<AppState>,
    Query(query): Query<ListLeasesQuery>,
) -> Result<Json<Vec<LeaseView>>, ApiError> {
    let filter = LeaseFilter {
        unit_id: query.unit_id,
        tenant_id: query.tenant_id,
        active_only: false,
    };
    let leases =
        query_handlers::list_leases(filter, state.clock.today(), &state.directory).await?;
    Ok(Json(leases))
}

/// GET /active
#[instrument(skip(state))]
async fn list_active_leases(
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaseView>>, ApiError> {
    let filter = LeaseFilter {
        active_only: true,
        ..LeaseFilter::default()
    };
    let leases =
        query_handlers::list_leases(filter, state.clock.today(), &state.directory).await?;
    Ok(Json(leases))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
) -> Result<Json<LeaseView>, ApiError> {
    let lease =
        query_handlers::get_lease_by_id(lease_id, state.clock.today(), &state.repos).await?;
    Ok(Json(lease))
}

/// POST /{id}/sign
#[instrument(skip(state))]
async fn sign_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::SignLease {
        correlation_id: Uuid::new_v4(),
        lease_id,
    };
    let outcome =
        command_handlers::handle_sign_lease(&command, state.clock.as_ref(), &state.repos).await?;
    Ok(Json(outcome))
}

/// POST /{id}/tenants
#[instrument(skip(state, request))]
async fn add_tenant(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
    Json(request): Json<AddTenantRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::AddLeaseTenant {
        correlation_id: Uuid::new_v4(),
        lease_id,
        tenant_id: request.tenant_id,
    };
    let outcome =
        command_handlers::handle_add_lease_tenant(&command, state.clock.as_ref(), &state.repos)
            .await?;
    Ok(Json(outcome))
}

/// DELETE /{id}/tenants/{tenant_id}
#[instrument(skip(state))]
async fn remove_tenant(
    State(state): State<AppState>,
    Path((lease_id, tenant_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::RemoveLeaseTenant {
        correlation_id: Uuid::new_v4(),
        lease_id,
        tenant_id,
    };
    let outcome =
        command_handlers::handle_remove_lease_tenant(&command, state.clock.as_ref(), &state.repos)
            .await?;
    Ok(Json(outcome))
}

/// POST /{id}/dates
#[instrument(skip(state, request))]
async fn update_dates(
    State(state): State<AppState>,
    Path(lease_id): Path<Uuid>,
    Json(request): Json<UpdateDatesRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::UpdateLeaseDates {
        correlation_id: Uuid::new_v4(),
        lease_id,
        start_date: request.start_date,
        end_date: request.end_date,
    };
    let outcome =
        command_handlers::handle_update_lease_dates(&command, state.clock.as_ref(), &state.repos)
            .await?;
    Ok(Json(outcome))
}

/// Returns the router for leases.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(draft_lease).get(list_leases))
        .route("/active", get(list_active_leases))
        .route("/{id}", get(get_lease))
        .route("/{id}/sign", post(sign_lease))
        .route("/{id}/tenants", post(add_tenant))
        .route("/{id}/tenants/{tenant_id}", delete(remove_tenant))
        .route("/{id}/dates", post(update_dates))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::{Method, StatusCode};
    use leasehold_core::snapshot::SnapshotPolicy;
    use leasehold_rentals::domain::aggregates::TenantProfile;
    use serde_json::{Value, json};

    use crate::routes::testing::{memory_state, send};

    /// Registers a unit and an approved tenant directly through the
    /// command handlers.
    async fn seed(state: &AppState) -> (Uuid, Uuid) {
        let clock = state.clock.as_ref();
        let unit = command_handlers::handle_register_unit(
            &commands::RegisterUnit {
                correlation_id: Uuid::new_v4(),
                unit_id: Uuid::new_v4(),
                address: "1 Main St".to_owned(),
                amenities: Vec::new(),
                built_in: None,
            },
            clock,
            &state.repos,
        )
        .await
        .unwrap();
        let tenant = command_handlers::handle_register_tenant(
            &commands::RegisterTenant {
                correlation_id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                profile: TenantProfile {
                    identification_number: "ID-1".to_owned(),
                    first_name: "Ada".to_owned(),
                    last_name: "Lovelace".to_owned(),
                    email: "ada@example.com".to_owned(),
                    phone_number: "555-0100".to_owned(),
                    date_of_birth: NaiveDate::from_ymd_opt(1990, 12, 10).unwrap(),
                },
            },
            clock,
            &state.repos,
            &state.directory,
        )
        .await
        .unwrap();
        command_handlers::handle_change_tenant_approval(
            &commands::ChangeTenantApproval {
                correlation_id: Uuid::new_v4(),
                tenant_id: tenant.id,
                approved: true,
            },
            clock,
            &state.repos,
        )
        .await
        .unwrap();
        (unit.id, tenant.id)
    }

    fn draft_body(unit_id: Uuid, tenant_id: Uuid) -> Value {
        json!({
            "unit_id": unit_id,
            "tenant_ids": [tenant_id],
            "start_date": "2026-01-01",
            "end_date": "2026-12-31",
        })
    }

    #[tokio::test]
    async fn test_draft_and_sign_lease() {
        // Arrange
        let state = memory_state();
        let (unit_id, tenant_id) = seed(&state).await;
        let (drafted, outcome) = send(
            router().with_state(state.clone()),
            Method::POST,
            "/",
            Some(&draft_body(unit_id, tenant_id)),
        )
        .await;
        let lease_id = outcome["id"].as_str().unwrap().to_owned();

        // Act
        let (signed, _) = send(
            router().with_state(state.clone()),
            Method::POST,
            &format!("/{lease_id}/sign"),
            None,
        )
        .await;
        let (_, lease) = send(
            router().with_state(state.clone()),
            Method::GET,
            &format!("/{lease_id}"),
            None,
        )
        .await;
        let (_, active) =
            send(router().with_state(state.clone()), Method::GET, "/active", None).await;
        let (_, by_unit) = send(
            router().with_state(state.clone()),
            Method::GET,
            &format!("/?unit_id={unit_id}"),
            None,
        )
        .await;
        let (_, by_other_tenant) = send(
            router().with_state(state.clone()),
            Method::GET,
            &format!("/?tenant_id={}", Uuid::new_v4()),
            None,
        )
        .await;

        // Assert
        assert_eq!(drafted, StatusCode::CREATED);
        assert_eq!(signed, StatusCode::OK);
        assert_eq!(lease["signed_by_tenant"], true);
        assert_eq!(lease["is_active"], true);
        assert_eq!(active.as_array().unwrap().len(), 1);
        assert_eq!(by_unit.as_array().unwrap().len(), 1);
        assert_eq!(by_other_tenant, json!([]));
        let unit = state.repos.units.get(unit_id).await.unwrap();
        assert!(unit.is_leased);
    }

    #[tokio::test]
    async fn test_draft_lease_for_unknown_unit_returns_400() {
        let state = memory_state();
        let (_, tenant_id) = seed(&state).await;

        let (status, json) = send(
            router().with_state(state),
            Method::POST,
            "/",
            Some(&draft_body(Uuid::new_v4(), tenant_id)),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_tenant_membership_and_dates() {
        // Arrange
        let state = memory_state();
        let (unit_id, tenant_id) = seed(&state).await;
        let (_, outcome) = send(
            router().with_state(state.clone()),
            Method::POST,
            "/",
            Some(&draft_body(unit_id, tenant_id)),
        )
        .await;
        let lease_id = outcome["id"].as_str().unwrap().to_owned();

        // Act
        let (duplicate, _) = send(
            router().with_state(state.clone()),
            Method::POST,
            &format!("/{lease_id}/tenants"),
            Some(&json!({ "tenant_id": tenant_id })),
        )
        .await;
        let (removed, _) = send(
            router().with_state(state.clone()),
            Method::DELETE,
            &format!("/{lease_id}/tenants/{tenant_id}"),
            None,
        )
        .await;
        let (bad_dates, _) = send(
            router().with_state(state.clone()),
            Method::POST,
            &format!("/{lease_id}/dates"),
            Some(&json!({ "end_date": "2025-06-01" })),
        )
        .await;
        let (moved, _) = send(
            router().with_state(state.clone()),
            Method::POST,
            &format!("/{lease_id}/dates"),
            Some(&json!({ "end_date": "2027-06-30" })),
        )
        .await;
        let (_, lease) = send(
            router().with_state(state),
            Method::GET,
            &format!("/{lease_id}"),
            None,
        )
        .await;

        // Assert
        assert_eq!(duplicate, StatusCode::BAD_REQUEST);
        assert_eq!(removed, StatusCode::OK);
        assert_eq!(bad_dates, StatusCode::BAD_REQUEST);
        assert_eq!(moved, StatusCode::OK);
        assert_eq!(lease["tenant_ids"], json!([]));
        assert_eq!(lease["end_date"], "2027-06-30");
        assert_eq!(lease["version"], 3);
    }

    #[tokio::test]
    async fn test_get_lease_reads_through_snapshots() {
        let state = crate::routes::testing::state_with_policy(SnapshotPolicy::every(1));
        let (unit_id, tenant_id) = seed(&state).await;
        let (_, outcome) = send(
            router().with_state(state.clone()),
            Method::POST,
            "/",
            Some(&draft_body(unit_id, tenant_id)),
        )
        .await;
        let lease_id = outcome["id"].as_str().unwrap().to_owned();

        let (status, lease) = send(
            router().with_state(state),
            Method::GET,
            &format!("/{lease_id}"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(lease["unit_id"], unit_id.to_string());
    }
}
