use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Engagement Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RsvpStatus {
    #[serde(alias = "going")]
    Yes,
    #[serde(alias = "interested")]
    Maybe,
    #[serde(alias = "not_going")]
    No,
}

impl RsvpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RsvpStatus::Yes => "yes",
            RsvpStatus::Maybe => "maybe",
            RsvpStatus::No => "no",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub occurrence_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub status: RsvpStatus,
    pub attending_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Values written by an upsert keyed on `(occurrence_id, user_id)`.
#[derive(Debug, Clone)]
pub struct ResponseUpsert {
    pub occurrence_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub status: RsvpStatus,
    pub attending_count: i64,
}

/// Read-time aggregate of an occurrence's responses, each a sum of `attending_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpTally {
    pub yes: i64,
    pub maybe: i64,
    pub no: i64,
}

impl RsvpTally {
    /// Head count of people attending: only `yes` responses count.
    pub fn attending(&self) -> i64 {
        self.yes
    }

    pub fn add(&mut self, status: RsvpStatus, attending_count: i64) {
        match status {
            RsvpStatus::Yes => self.yes += attending_count,
            RsvpStatus::Maybe => self.maybe += attending_count,
            RsvpStatus::No => self.no += attending_count,
        }
    }
}
