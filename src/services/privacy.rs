//! Viewer-specific redaction of resident profiles.

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::models::{FamilyRelationship, PrivacySettings, RawProfile};
use crate::services::visibility::Viewer;

/// How the viewer relates to the profile's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerRelation {
    SelfView,
    Family,
    TenantAdmin,
    Member,
}

impl ViewerRelation {
    pub fn between(viewer: &Viewer, profile: &RawProfile) -> Self {
        if viewer.user_id == profile.id {
            return ViewerRelation::SelfView;
        }

        let same_family = match (&viewer.family_unit_id, &profile.family_unit_id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        if same_family {
            return ViewerRelation::Family;
        }

        if viewer.is_tenant_admin && viewer.tenant_id == profile.tenant_id {
            return ViewerRelation::TenantAdmin;
        }

        ViewerRelation::Member
    }

    /// Relations that bypass the individual toggles.
    pub fn sees_everything(self) -> bool {
        !matches!(self, ViewerRelation::Member)
    }
}

/// Fully resolved flags. Built only through [`EffectivePrivacy::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectivePrivacy {
    pub show_email: bool,
    pub show_phone: bool,
    pub show_birthday: bool,
    pub show_birth_country: bool,
    pub show_current_country: bool,
    pub show_languages: bool,
    pub show_preferred_language: bool,
    pub show_journey_stage: bool,
    pub show_estimated_move_in_date: bool,
    pub show_profile_picture: bool,
    pub show_neighborhood: bool,
    pub show_family: bool,
    pub show_family_relationships: bool,
    pub show_interests: bool,
    pub show_skills: bool,
    pub show_open_to_requests: bool,
    pub show_about: bool,
}

impl EffectivePrivacy {
    const ALL_VISIBLE: EffectivePrivacy = EffectivePrivacy {
        show_email: true,
        show_phone: true,
        show_birthday: true,
        show_birth_country: true,
        show_current_country: true,
        show_languages: true,
        show_preferred_language: true,
        show_journey_stage: true,
        show_estimated_move_in_date: true,
        show_profile_picture: true,
        show_neighborhood: true,
        show_family: true,
        show_family_relationships: true,
        show_interests: true,
        show_skills: true,
        show_open_to_requests: true,
        show_about: true,
    };

    /// The one place unset flags are defaulted. A missing row, or a missing
    /// flag within a row, resolves to visible.
    pub fn resolve(settings: Option<&PrivacySettings>) -> Self {
        let Some(s) = settings else {
            return Self::ALL_VISIBLE;
        };
        let on = |flag: Option<bool>| flag.unwrap_or(true);

        EffectivePrivacy {
            show_email: on(s.show_email),
            show_phone: on(s.show_phone),
            show_birthday: on(s.show_birthday),
            show_birth_country: on(s.show_birth_country),
            show_current_country: on(s.show_current_country),
            show_languages: on(s.show_languages),
            show_preferred_language: on(s.show_preferred_language),
            show_journey_stage: on(s.show_journey_stage),
            show_estimated_move_in_date: on(s.show_estimated_move_in_date),
            show_profile_picture: on(s.show_profile_picture),
            show_neighborhood: on(s.show_neighborhood),
            show_family: on(s.show_family),
            show_family_relationships: on(s.show_family_relationships),
            show_interests: on(s.show_interests),
            show_skills: on(s.show_skills),
            show_open_to_requests: on(s.show_open_to_requests),
            show_about: on(s.show_about),
        }
    }
}

/// Profile as one particular viewer may see it. Hidden fields are omitted
/// from the JSON entirely.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileView {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journey_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_move_in_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighborhood_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighborhood_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_unit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_relationships: Option<Vec<FamilyRelationship>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_to_requests: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
}

fn gate<T: Clone>(show: bool, value: &Option<T>) -> Option<T> {
    if show {
        value.clone()
    } else {
        None
    }
}

fn gate_list<T: Clone>(show: bool, values: &[T]) -> Option<Vec<T>> {
    show.then(|| values.to_vec())
}

pub struct PrivacyProjector;

impl PrivacyProjector {
    /// Pure projection of `(profile, settings, is_family)`.
    pub fn project(
        profile: &RawProfile,
        settings: Option<&PrivacySettings>,
        is_family: bool,
    ) -> ProfileView {
        let flags = if is_family {
            EffectivePrivacy::ALL_VISIBLE
        } else {
            EffectivePrivacy::resolve(settings)
        };

        ProfileView {
            id: profile.id.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: gate(flags.show_email, &profile.email),
            phone: gate(flags.show_phone, &profile.phone),
            birthday: gate(flags.show_birthday, &profile.birthday),
            birth_country: gate(flags.show_birth_country, &profile.birth_country),
            current_country: gate(flags.show_current_country, &profile.current_country),
            languages: gate_list(flags.show_languages, &profile.languages),
            preferred_language: gate(flags.show_preferred_language, &profile.preferred_language),
            journey_stage: gate(flags.show_journey_stage, &profile.journey_stage),
            estimated_move_in_date: gate(
                flags.show_estimated_move_in_date,
                &profile.estimated_move_in_date,
            ),
            profile_picture_url: gate(flags.show_profile_picture, &profile.profile_picture_url),
            // Joined through the lot; one flag governs both columns
            neighborhood_id: gate(flags.show_neighborhood, &profile.neighborhood_id),
            neighborhood_name: gate(flags.show_neighborhood, &profile.neighborhood_name),
            family_unit_id: gate(flags.show_family, &profile.family_unit_id),
            family_name: gate(flags.show_family, &profile.family_name),
            family_relationships: gate_list(
                flags.show_family_relationships,
                &profile.family_relationships,
            ),
            interests: gate_list(flags.show_interests, &profile.interests),
            skills: gate_list(flags.show_skills, &profile.skills),
            open_to_requests: gate(flags.show_open_to_requests, &profile.open_to_requests),
            about: gate(flags.show_about, &profile.about),
        }
    }

    pub fn project_for(
        viewer: &Viewer,
        profile: &RawProfile,
        settings: Option<&PrivacySettings>,
    ) -> ProfileView {
        let relation = ViewerRelation::between(viewer, profile);
        Self::project(profile, settings, relation.sees_everything())
    }
}
