use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::db::models::UpdatePrivacySettings;
use crate::error::AppResult;
use crate::routes::auth::AuthViewer;
use crate::services::privacy::ProfileView;
use crate::services::profiles::{PrivacyOverview, ProfileService};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me/privacy", get(get_privacy).put(update_privacy))
        .route("/:user_id", get(get_profile))
}

// ============================================================================
// Handlers
// ============================================================================

/// Another resident's profile, redacted for the caller.
async fn get_profile(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Path(user_id): Path<String>,
) -> AppResult<Json<ProfileView>> {
    let profile = ProfileService::get_profile(&state, &viewer, &user_id).await?;
    Ok(Json(profile))
}

async fn get_privacy(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
) -> AppResult<Json<PrivacyOverview>> {
    let overview = ProfileService::get_privacy(&state, &viewer).await?;
    Ok(Json(overview))
}

async fn update_privacy(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
    Json(update): Json<UpdatePrivacySettings>,
) -> AppResult<Json<PrivacyOverview>> {
    let overview = ProfileService::update_privacy(&state, &viewer, update).await?;
    Ok(Json(overview))
}
