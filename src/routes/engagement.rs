use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::error::AppResult;
use crate::routes::auth::AuthViewer;
use crate::services::engagement::{
    EngagementLedger, ResponsesView, RsvpOutcome, RsvpRequest, TallyView,
};
use crate::services::series::SeriesCoordinator;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:occurrence_id/rsvp", post(rsvp))
        .route("/:occurrence_id/tally", get(tally))
        .route("/:occurrence_id/responses", get(responses))
}

// ============================================================================
// Handlers
// ============================================================================

/// Set or clear (`"status": null`) the caller's response.
async fn rsvp(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(occurrence_id): Path<String>,
    Json(request): Json<RsvpRequest>,
) -> AppResult<Json<RsvpOutcome>> {
    let outcome = SeriesCoordinator::rsvp(&state, &viewer, &occurrence_id, request).await?;
    Ok(Json(outcome))
}

async fn tally(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(occurrence_id): Path<String>,
) -> AppResult<Json<TallyView>> {
    let tally = EngagementLedger::tally(&state, &viewer, &occurrence_id).await?;
    Ok(Json(tally))
}

async fn responses(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(occurrence_id): Path<String>,
) -> AppResult<Json<ResponsesView>> {
    let responses = EngagementLedger::responses(&state, &viewer, &occurrence_id).await?;
    Ok(Json(responses))
}
