use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Resident Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ResidentRole {
    Resident,
    TenantAdmin,
}

/// A resident's placement in the community, as needed to build a viewer.
#[derive(Debug, Clone, FromRow)]
pub struct ResidentMembership {
    pub id: String,
    pub tenant_id: String,
    pub family_unit_id: Option<String>,
    pub neighborhood_id: Option<String>,
    pub role: ResidentRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRelationship {
    pub related_resident_id: String,
    pub relationship: String,
}

/// Profile row joined with its lot's neighborhood and its family unit.
/// List columns are stored as JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub id: String,
    pub tenant_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub birth_country: Option<String>,
    pub current_country: Option<String>,
    pub languages: Option<String>,
    pub preferred_language: Option<String>,
    pub journey_stage: Option<String>,
    pub estimated_move_in_date: Option<NaiveDate>,
    pub profile_picture_url: Option<String>,
    pub interests: Option<String>,
    pub skills: Option<String>,
    pub open_to_requests: Option<bool>,
    pub about: Option<String>,
    pub family_relationships: Option<String>,
    pub family_unit_id: Option<String>,
    pub family_name: Option<String>,
    pub neighborhood_id: Option<String>,
    pub neighborhood_name: Option<String>,
}

/// Unredacted profile as stored. Never serialized directly to a viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProfile {
    pub id: String,
    pub tenant_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub birth_country: Option<String>,
    pub current_country: Option<String>,
    pub languages: Vec<String>,
    pub preferred_language: Option<String>,
    pub journey_stage: Option<String>,
    pub estimated_move_in_date: Option<NaiveDate>,
    pub profile_picture_url: Option<String>,
    pub interests: Vec<String>,
    pub skills: Vec<String>,
    pub open_to_requests: Option<bool>,
    pub about: Option<String>,
    pub family_relationships: Vec<FamilyRelationship>,
    pub family_unit_id: Option<String>,
    pub family_name: Option<String>,
    pub neighborhood_id: Option<String>,
    pub neighborhood_name: Option<String>,
}

fn parse_json_list<T: serde::de::DeserializeOwned>(
    profile_id: &str,
    column: &str,
    raw: Option<String>,
) -> Vec<T> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Vec::new(),
        Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
            tracing::warn!(
                "Ignoring unparsable {} for resident {}: {}",
                column,
                profile_id,
                e
            );
            Vec::new()
        }),
    }
}

impl From<ProfileRow> for RawProfile {
    fn from(row: ProfileRow) -> Self {
        let languages = parse_json_list(&row.id, "languages", row.languages);
        let interests = parse_json_list(&row.id, "interests", row.interests);
        let skills = parse_json_list(&row.id, "skills", row.skills);
        let family_relationships =
            parse_json_list(&row.id, "family_relationships", row.family_relationships);

        RawProfile {
            id: row.id,
            tenant_id: row.tenant_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            birthday: row.birthday,
            birth_country: row.birth_country,
            current_country: row.current_country,
            languages,
            preferred_language: row.preferred_language,
            journey_stage: row.journey_stage,
            estimated_move_in_date: row.estimated_move_in_date,
            profile_picture_url: row.profile_picture_url,
            interests,
            skills,
            open_to_requests: row.open_to_requests,
            about: row.about,
            family_relationships,
            family_unit_id: row.family_unit_id,
            family_name: row.family_name,
            neighborhood_id: row.neighborhood_id,
            neighborhood_name: row.neighborhood_name,
        }
    }
}
