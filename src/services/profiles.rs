use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::db::models::{PrivacySettings, UpdatePrivacySettings};
use crate::db::repository::{PrivacySettingsRepository, ResidentRepository};
use crate::error::{AppError, AppResult};
use crate::services::privacy::{EffectivePrivacy, PrivacyProjector, ProfileView};
use crate::services::visibility::Viewer;
use crate::AppState;

/// The caller's own privacy configuration: what is stored and what applies.
#[derive(Debug, Clone, Serialize)]
pub struct PrivacyOverview {
    pub stored: Option<PrivacySettings>,
    pub effective: EffectivePrivacy,
}

impl PrivacyOverview {
    fn from_stored(stored: Option<PrivacySettings>) -> Self {
        PrivacyOverview {
            effective: EffectivePrivacy::resolve(stored.as_ref()),
            stored,
        }
    }
}

pub struct ProfileService;

impl ProfileService {
    pub async fn get_profile(
        state: &Arc<AppState>,
        viewer: &Viewer,
        user_id: &str,
    ) -> AppResult<ProfileView> {
        let profile = ResidentRepository::find_profile(&state.db, &viewer.tenant_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Resident not found".to_string()))?;
        let settings = PrivacySettingsRepository::find_by_user_id(&state.db, &profile.id).await?;

        Ok(PrivacyProjector::project_for(
            viewer,
            &profile,
            settings.as_ref(),
        ))
    }

    /// Projected profiles for a batch of residents, keyed by resident id.
    /// Ids outside the viewer's tenant are silently absent.
    pub async fn profile_views(
        state: &Arc<AppState>,
        viewer: &Viewer,
        user_ids: &[String],
    ) -> AppResult<HashMap<String, ProfileView>> {
        let (profiles, settings) = futures::try_join!(
            ResidentRepository::find_profiles(&state.db, &viewer.tenant_id, user_ids),
            PrivacySettingsRepository::find_many(&state.db, user_ids),
        )?;

        let settings: HashMap<String, PrivacySettings> = settings
            .into_iter()
            .map(|s| (s.user_id.clone(), s))
            .collect();

        Ok(profiles
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    PrivacyProjector::project_for(viewer, p, settings.get(&p.id)),
                )
            })
            .collect())
    }

    pub async fn get_privacy(state: &Arc<AppState>, viewer: &Viewer) -> AppResult<PrivacyOverview> {
        let stored = PrivacySettingsRepository::find_by_user_id(&state.db, &viewer.user_id).await?;
        Ok(PrivacyOverview::from_stored(stored))
    }

    /// Merge the provided flags over the stored row, creating it when absent.
    pub async fn update_privacy(
        state: &Arc<AppState>,
        viewer: &Viewer,
        update: UpdatePrivacySettings,
    ) -> AppResult<PrivacyOverview> {
        let current = PrivacySettingsRepository::find_by_user_id(&state.db, &viewer.user_id)
            .await?
            .unwrap_or_else(|| PrivacySettings {
                user_id: viewer.user_id.clone(),
                ..PrivacySettings::default()
            });

        let merged = current.merged(&update);
        let saved =
            PrivacySettingsRepository::upsert(&state.db, &merged, Utc::now().naive_utc()).await?;

        tracing::info!("Privacy settings updated for {}", viewer.user_id);
        Ok(PrivacyOverview::from_stored(Some(saved)))
    }
}
