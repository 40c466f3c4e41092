use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Privacy Settings Models
// ============================================================================

/// One row per resident. A `None` flag has never been set.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PrivacySettings {
    pub user_id: String,
    pub show_email: Option<bool>,
    pub show_phone: Option<bool>,
    pub show_birthday: Option<bool>,
    pub show_birth_country: Option<bool>,
    pub show_current_country: Option<bool>,
    pub show_languages: Option<bool>,
    pub show_preferred_language: Option<bool>,
    pub show_journey_stage: Option<bool>,
    pub show_estimated_move_in_date: Option<bool>,
    pub show_profile_picture: Option<bool>,
    pub show_neighborhood: Option<bool>,
    pub show_family: Option<bool>,
    pub show_family_relationships: Option<bool>,
    pub show_interests: Option<bool>,
    pub show_skills: Option<bool>,
    pub show_open_to_requests: Option<bool>,
    pub show_about: Option<bool>,
    #[serde(skip)]
    pub updated_at: Option<NaiveDateTime>,
}

/// Partial update; only provided flags are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePrivacySettings {
    pub show_email: Option<bool>,
    pub show_phone: Option<bool>,
    pub show_birthday: Option<bool>,
    pub show_birth_country: Option<bool>,
    pub show_current_country: Option<bool>,
    pub show_languages: Option<bool>,
    pub show_preferred_language: Option<bool>,
    pub show_journey_stage: Option<bool>,
    pub show_estimated_move_in_date: Option<bool>,
    pub show_profile_picture: Option<bool>,
    pub show_neighborhood: Option<bool>,
    pub show_family: Option<bool>,
    pub show_family_relationships: Option<bool>,
    pub show_interests: Option<bool>,
    pub show_skills: Option<bool>,
    pub show_open_to_requests: Option<bool>,
    pub show_about: Option<bool>,
}

impl PrivacySettings {
    /// Overlay an update onto the stored flags.
    pub fn merged(&self, update: &UpdatePrivacySettings) -> PrivacySettings {
        PrivacySettings {
            user_id: self.user_id.clone(),
            show_email: update.show_email.or(self.show_email),
            show_phone: update.show_phone.or(self.show_phone),
            show_birthday: update.show_birthday.or(self.show_birthday),
            show_birth_country: update.show_birth_country.or(self.show_birth_country),
            show_current_country: update.show_current_country.or(self.show_current_country),
            show_languages: update.show_languages.or(self.show_languages),
            show_preferred_language: update
                .show_preferred_language
                .or(self.show_preferred_language),
            show_journey_stage: update.show_journey_stage.or(self.show_journey_stage),
            show_estimated_move_in_date: update
                .show_estimated_move_in_date
                .or(self.show_estimated_move_in_date),
            show_profile_picture: update.show_profile_picture.or(self.show_profile_picture),
            show_neighborhood: update.show_neighborhood.or(self.show_neighborhood),
            show_family: update.show_family.or(self.show_family),
            show_family_relationships: update
                .show_family_relationships
                .or(self.show_family_relationships),
            show_interests: update.show_interests.or(self.show_interests),
            show_skills: update.show_skills.or(self.show_skills),
            show_open_to_requests: update.show_open_to_requests.or(self.show_open_to_requests),
            show_about: update.show_about.or(self.show_about),
            updated_at: self.updated_at,
        }
    }
}
