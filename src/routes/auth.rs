use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::get,
    Json, Router,
};

use crate::error::{AppError, AppResult};
use crate::services::auth::AuthService;
use crate::services::privacy::ProfileView;
use crate::services::profiles::ProfileService;
use crate::services::visibility::Viewer;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/me", get(me))
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, serde::Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub viewer: Viewer,
    pub profile: ProfileView,
}

/// The authenticated resident with their own, unredacted profile.
async fn me(
    State(state): State<Arc<AppState>>,
    AuthViewer(viewer): AuthViewer,
) -> AppResult<Json<MeResponse>> {
    let profile = ProfileService::get_profile(&state, &viewer, &viewer.user_id).await?;
    Ok(Json(MeResponse { viewer, profile }))
}

// ============================================================================
// Auth Extractor
// ============================================================================

/// Extractor for the authenticated viewer
pub struct AuthViewer(pub Viewer);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;

    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        tracing::debug!("Authorization header doesn't start with 'Bearer '");
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthViewer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            tracing::debug!("Missing or invalid Authorization header");
            AppError::Unauthorized
        })?;

        let viewer = AuthService::viewer_from_token(state, token)
            .await
            .map_err(|e| {
                tracing::debug!("Failed to resolve viewer from token: {:?}", e);
                e
            })?;

        tracing::debug!("Authenticated viewer: {}", viewer.user_id);
        Ok(AuthViewer(viewer))
    }
}
