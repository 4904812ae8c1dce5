//! Routes for tenants.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use leasehold_rentals::application::command_handlers::{self, CommandOutcome};
use leasehold_rentals::application::query_handlers::{self, TenantView};
use leasehold_rentals::domain::aggregates::TenantProfile;
use leasehold_rentals::domain::commands;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use super::created;
use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct RegisterTenantRequest {
    /// Identifier to use; generated when absent.
    pub tenant_id: Option<Uuid>,
    /// Government or internal identification number.
    pub identification_number: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone number.
    pub phone_number: String,
    /// Date of birth.
    pub date_of_birth: NaiveDate,
}

/// Request body for POST /{id}/contact.
#[derive(Debug, Deserialize)]
pub struct UpdateContactInfoRequest {
    /// New email, if changing.
    pub email: Option<String>,
    /// New phone number, if changing.
    pub phone_number: Option<String>,
}

/// POST /
#[instrument(skip(state, request))]
async fn register_tenant(
    State(state): State<AppState>,
    Json(request): Json<RegisterTenantRequest>,
) -> Result<Response, ApiError> {
    let command = commands::RegisterTenant {
        correlation_id: Uuid::new_v4(),
        tenant_id: request.tenant_id.unwrap_or_else(Uuid::new_v4),
        profile: TenantProfile {
            identification_number: request.identification_number,
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            phone_number: request.phone_number,
            date_of_birth: request.date_of_birth,
        },
    };
    let outcome = command_handlers::handle_register_tenant(
        &command,
        state.clock.as_ref(),
        &state.repos,
        &state.directory,
    )
    .await?;
    Ok(created(outcome))
}

/// GET /
#[instrument(skip(state))]
async fn list_tenants(State(state): State<AppState>) -> Result<Json<Vec<TenantView>>, ApiError> {
    Ok(Json(query_handlers::list_tenants(false, &state.directory).await?))
}

/// GET /approved
#[instrument(skip(state))]
async fn list_approved_tenants(
    State(state): State<AppState>,
) -> Result<Json<Vec<TenantView>>, ApiError> {
    Ok(Json(query_handlers::list_tenants(true, &state.directory).await?))
}

/// GET /by-identification/{number}
#[instrument(skip(state))]
async fn get_tenant_by_identification_number(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Response, ApiError> {
    let tenant =
        query_handlers::find_tenant_by_identification_number(&number, &state.directory).await?;
    Ok(match tenant {
        Some(view) => Json(view).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "tenant_not_found",
                message: format!("no tenant with identification number {number}"),
            }),
        )
            .into_response(),
    })
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<TenantView>, ApiError> {
    Ok(Json(
        query_handlers::get_tenant_by_id(tenant_id, &state.repos).await?,
    ))
}

async fn change_approval(
    state: &AppState,
    tenant_id: Uuid,
    approved: bool,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::ChangeTenantApproval {
        correlation_id: Uuid::new_v4(),
        tenant_id,
        approved,
    };
    let outcome = command_handlers::handle_change_tenant_approval(
        &command,
        state.clock.as_ref(),
        &state.repos,
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /{id}/approve
#[instrument(skip(state))]
async fn approve_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<CommandOutcome>, ApiError> {
    change_approval(&state, tenant_id, true).await
}

/// POST /{id}/disapprove
#[instrument(skip(state))]
async fn disapprove_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<CommandOutcome>, ApiError> {
    change_approval(&state, tenant_id, false).await
}

/// POST /{id}/contact
#[instrument(skip(state, request))]
async fn update_contact_info(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<UpdateContactInfoRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::UpdateTenantContactInfo {
        correlation_id: Uuid::new_v4(),
        tenant_id,
        email: request.email,
        phone_number: request.phone_number,
    };
    let outcome = command_handlers::handle_update_tenant_contact_info(
        &command,
        state.clock.as_ref(),
        &state.repos,
    )
    .await?;
    Ok(Json(outcome))
}

/// Returns the router for tenants.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_tenant).get(list_tenants))
        .route("/approved", get(list_approved_tenants))
        .route(
            "/by-identification/{number}",
            get(get_tenant_by_identification_number),
        )
        .route("/{id}", get(get_tenant))
        .route("/{id}/approve", post(approve_tenant))
        .route("/{id}/disapprove", post(disapprove_tenant))
        .route("/{id}/contact", post(update_contact_info))
}
