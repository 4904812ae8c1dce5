//! Read endpoint over the global notification log.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use leasehold_core::notification::{DEFAULT_SECTION_SIZE, Section};
use serde::Deserialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for GET /.
#[derive(Debug, Default, Deserialize)]
pub struct SectionQuery {
    /// Section id `"first,last"`; takes precedence over `start`/`limit`.
    pub section: Option<String>,
    /// First notification id to return. Defaults to 1.
    pub start: Option<i64>,
    /// Maximum number of notifications.
    pub limit: Option<i64>,
    /// Comma-separated topics to keep.
    pub topics: Option<String>,
}

impl SectionQuery {
    fn topics(&self) -> Vec<String> {
        self.topics
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// GET /
#[instrument(skip(state))]
async fn get_section(
    State(state): State<AppState>,
    Query(query): Query<SectionQuery>,
) -> Result<Json<Section>, ApiError> {
    let topics = query.topics();
    let section = match &query.section {
        Some(section_id) => state.log.section(section_id, &topics).await?,
        None => {
            state
                .log
                .select(
                    query.start.unwrap_or(1),
                    query.limit.unwrap_or(DEFAULT_SECTION_SIZE),
                    &topics,
                )
                .await?
        }
    };
    Ok(Json(section))
}

/// Returns the router for the notification log.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_section))
}
