//! Routes for rental units.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use leasehold_rentals::application::command_handlers::{self, CommandOutcome};
use leasehold_rentals::application::query_handlers::{self, UnitView};
use leasehold_rentals::domain::commands::{self, UnitStatusChange};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use super::created;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct RegisterUnitRequest {
    /// Identifier to use; generated when absent.
    pub unit_id: Option<Uuid>,
    /// Street address.
    pub address: String,
    /// Amenities.
    #[serde(default)]
    pub amenities: Vec<String>,
    /// Year of construction.
    pub built_in: Option<i32>,
}

/// Request body for POST /{id}/amenities.
#[derive(Debug, Deserialize)]
pub struct UpdateAmenitiesRequest {
    /// The full new amenity list.
    pub amenities: Vec<String>,
}

/// Request body for POST /{id}/address.
#[derive(Debug, Deserialize)]
pub struct UpdateAddressRequest {
    /// The new street address.
    pub address: String,
}

/// Request body for POST /{id}/built-in-year.
#[derive(Debug, Deserialize)]
pub struct UpdateBuiltInYearRequest {
    /// The corrected year of construction.
    pub year: i32,
}

/// POST /
#[instrument(skip(state, request))]
async fn register_unit(
    State(state): State<AppState>,
    Json(request): Json<RegisterUnitRequest>,
) -> Result<Response, ApiError> {
    let command = commands::RegisterUnit {
        correlation_id: Uuid::new_v4(),
        unit_id: request.unit_id.unwrap_or_else(Uuid::new_v4),
        address: request.address,
        amenities: request.amenities,
        built_in: request.built_in,
    };
    let outcome =
        command_handlers::handle_register_unit(&command, state.clock.as_ref(), &state.repos)
            .await?;
    Ok(created(outcome))
}

/// GET /
#[instrument(skip(state))]
async fn list_units(State(state): State<AppState>) -> Result<Json<Vec<UnitView>>, ApiError> {
    Ok(Json(query_handlers::list_units(false, &state.directory).await?))
}

/// GET /available
#[instrument(skip(state))]
async fn list_available_units(
    State(state): State<AppState>,
) -> Result<Json<Vec<UnitView>>, ApiError> {
    Ok(Json(query_handlers::list_units(true, &state.directory).await?))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> Result<Json<UnitView>, ApiError> {
    Ok(Json(query_handlers::get_unit_by_id(unit_id, &state.repos).await?))
}

/// POST /{id}/amenities
#[instrument(skip(state, request))]
async fn update_amenities(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    Json(request): Json<UpdateAmenitiesRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::UpdateUnitAmenities {
        correlation_id: Uuid::new_v4(),
        unit_id,
        amenities: request.amenities,
    };
    let outcome = command_handlers::handle_update_unit_amenities(
        &command,
        state.clock.as_ref(),
        &state.repos,
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /{id}/address
#[instrument(skip(state, request))]
async fn update_address(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    Json(request): Json<UpdateAddressRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::UpdateUnitAddress {
        correlation_id: Uuid::new_v4(),
        unit_id,
        address: request.address,
    };
    let outcome =
        command_handlers::handle_update_unit_address(&command, state.clock.as_ref(), &state.repos)
            .await?;
    Ok(Json(outcome))
}

/// POST /{id}/built-in-year
#[instrument(skip(state, request))]
async fn update_built_in_year(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    Json(request): Json<UpdateBuiltInYearRequest>,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::UpdateUnitBuiltInYear {
        correlation_id: Uuid::new_v4(),
        unit_id,
        year: request.year,
    };
    let outcome = command_handlers::handle_update_unit_built_in_year(
        &command,
        state.clock.as_ref(),
        &state.repos,
    )
    .await?;
    Ok(Json(outcome))
}

async fn change_status(
    state: &AppState,
    unit_id: Uuid,
    status: UnitStatusChange,
) -> Result<Json<CommandOutcome>, ApiError> {
    let command = commands::ChangeUnitStatus {
        correlation_id: Uuid::new_v4(),
        unit_id,
        status,
    };
    let outcome =
        command_handlers::handle_change_unit_status(&command, state.clock.as_ref(), &state.repos)
            .await?;
    Ok(Json(outcome))
}

/// POST /{id}/leased
#[instrument(skip(state))]
async fn mark_as_leased(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> Result<Json<CommandOutcome>, ApiError> {
    change_status(&state, unit_id, UnitStatusChange::Leased).await
}

/// POST /{id}/available
#[instrument(skip(state))]
async fn mark_as_available(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> Result<Json<CommandOutcome>, ApiError> {
    change_status(&state, unit_id, UnitStatusChange::Available).await
}

/// POST /{id}/leasable
#[instrument(skip(state))]
async fn mark_as_leasable(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> Result<Json<CommandOutcome>, ApiError> {
    change_status(&state, unit_id, UnitStatusChange::Leasable).await
}

/// POST /{id}/unleasable
#[instrument(skip(state))]
async fn mark_as_unleasable(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> Result<Json<CommandOutcome>, ApiError> {
    change_status(&state, unit_id, UnitStatusChange::Unleasable).await
}

/// Returns the router for units.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_unit).get(list_units))
        .route("/available", get(list_available_units))
        .route("/{id}", get(get_unit))
        .route("/{id}/amenities", post(update_amenities))
        .route("/{id}/address", post(update_address))
        .route("/{id}/built-in-year", post(update_built_in_year))
        .route("/{id}/leased", post(mark_as_leased))
        .route("/{id}/available", post(mark_as_available))
        .route("/{id}/leasable", post(mark_as_leasable))
        .route("/{id}/unleasable", post(mark_as_unleasable))
}
