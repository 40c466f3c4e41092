use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{RecordEdit, ScopeConfig, ShareableRecord};
use crate::error::AppResult;
use crate::routes::auth::AuthViewer;
use crate::services::records::{
    NewAnnouncement, NewCheckIn, NewEvent, RecordFilter, RecordService, RecordView, ScopeUpdate,
};
use crate::services::series::{CancelRequest, SeriesChangeOutcome, SeriesCoordinator, SeriesScope};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_records))
        .route("/check-ins", post(create_check_in))
        .route("/events", post(create_event))
        .route("/announcements", post(create_announcement))
        // Specific sub-routes before the generic "/:id" route
        .route("/:id/scope", put(update_scope))
        .route("/:id/extend", post(extend_check_in))
        .route("/:id/end", post(end_check_in))
        .route("/:id/cancel", post(cancel_event))
        .route("/:id/publish", post(publish_announcement))
        .route("/:id/archive", post(archive_announcement))
        .route(
            "/:id",
            get(get_record).patch(edit_record).delete(delete_record),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// `?scope=this|series` on series-aware writes.
#[derive(Debug, Default, Deserialize)]
pub struct SeriesScopeQuery {
    pub scope: Option<SeriesScope>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub additional_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct CreatedEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    pub occurrences: Vec<ShareableRecord>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_records(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Query(filter): Query<RecordFilter>,
) -> AppResult<Json<Vec<RecordView>>> {
    let records = RecordService::list_visible(&state, &viewer, filter).await?;
    Ok(Json(records))
}

async fn get_record(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(id): Path<String>,
) -> AppResult<Json<RecordView>> {
    let record = RecordService::get_visible(&state, &viewer, &id).await?;
    Ok(Json(record))
}

async fn create_check_in(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Json(request): Json<NewCheckIn>,
) -> AppResult<(StatusCode, Json<ShareableRecord>)> {
    let record = RecordService::create_check_in(&state, &viewer, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Json(request): Json<NewEvent>,
) -> AppResult<(StatusCode, Json<CreatedEvent>)> {
    let occurrences = RecordService::create_event(&state, &viewer, request).await?;
    let series_id = occurrences
        .first()
        .filter(|template| template.is_series_member())
        .map(|template| template.id.clone());
    Ok((
        StatusCode::CREATED,
        Json(CreatedEvent {
            series_id,
            occurrences,
        }),
    ))
}

async fn create_announcement(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Json(request): Json<NewAnnouncement>,
) -> AppResult<(StatusCode, Json<ShareableRecord>)> {
    let record = RecordService::create_announcement(&state, &viewer, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_scope(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(id): Path<String>,
    Json(scope): Json<ScopeConfig>,
) -> AppResult<Json<ScopeUpdate>> {
    let update = RecordService::update_scope(&state, &viewer, &id, scope).await?;
    Ok(Json(update))
}

/// Series-aware field edit. A series member without `?scope=` is a 409.
async fn edit_record(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(id): Path<String>,
    Query(query): Query<SeriesScopeQuery>,
    Json(edit): Json<RecordEdit>,
) -> AppResult<Json<SeriesChangeOutcome>> {
    let outcome = SeriesCoordinator::edit(&state, &viewer, &id, edit, query.scope).await?;
    Ok(Json(outcome))
}

async fn extend_check_in(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(id): Path<String>,
    Json(request): Json<ExtendRequest>,
) -> AppResult<Json<ShareableRecord>> {
    let record =
        RecordService::extend_check_in(&state, &viewer, &id, request.additional_minutes).await?;
    Ok(Json(record))
}

async fn end_check_in(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(id): Path<String>,
) -> AppResult<Json<ShareableRecord>> {
    let record = RecordService::end_check_in(&state, &viewer, &id).await?;
    Ok(Json(record))
}

async fn cancel_event(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(id): Path<String>,
    Query(query): Query<SeriesScopeQuery>,
    request: Option<Json<CancelRequest>>,
) -> AppResult<Json<SeriesChangeOutcome>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let outcome = SeriesCoordinator::cancel(&state, &viewer, &id, request, query.scope).await?;
    Ok(Json(outcome))
}

async fn publish_announcement(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(id): Path<String>,
) -> AppResult<Json<ShareableRecord>> {
    let record = RecordService::publish_announcement(&state, &viewer, &id).await?;
    Ok(Json(record))
}

async fn archive_announcement(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(id): Path<String>,
) -> AppResult<Json<ShareableRecord>> {
    let record = RecordService::archive_announcement(&state, &viewer, &id).await?;
    Ok(Json(record))
}

async fn delete_record(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    RecordService::delete_record(&state, &viewer, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
