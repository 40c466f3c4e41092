use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Shareable Record Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RecordKind {
    CheckIn,
    Event,
    Announcement,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::CheckIn => "check_in",
            RecordKind::Event => "event",
            RecordKind::Announcement => "announcement",
        }
    }

    /// Events and announcements may also be managed by a tenant admin.
    pub fn admin_manageable(self) -> bool {
        matches!(self, RecordKind::Event | RecordKind::Announcement)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VisibilityScope {
    Community,
    Neighborhood,
    /// Invite-only. Older clients send `invite_only`.
    #[serde(alias = "invite_only")]
    Private,
}

impl VisibilityScope {
    /// Audience breadth: private < neighborhood < community.
    pub fn breadth(self) -> u8 {
        match self {
            VisibilityScope::Private => 0,
            VisibilityScope::Neighborhood => 1,
            VisibilityScope::Community => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Ended,
    Cancelled,
    Draft,
    Published,
    Archived,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Ended => "ended",
            RecordStatus::Cancelled => "cancelled",
            RecordStatus::Draft => "draft",
            RecordStatus::Published => "published",
            RecordStatus::Archived => "archived",
        }
    }

    pub fn accepts_responses(self) -> bool {
        matches!(self, RecordStatus::Active | RecordStatus::Published)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShareableRecord {
    pub id: String,
    pub tenant_id: String,
    pub kind: RecordKind,
    pub created_by: String,
    pub title: String,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub visibility_scope: VisibilityScope,
    pub status: RecordStatus,

    // Check-ins are bounded by a start time and a duration
    pub start_time: Option<NaiveDateTime>,
    pub duration_minutes: Option<i64>,

    // Events are bounded by dates
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    // Series linkage
    pub parent_record_id: Option<String>,
    pub recurrence_rule: Option<String>,

    pub max_attendees: Option<i64>,
    pub rsvp_deadline: Option<NaiveDateTime>,

    pub ended_at: Option<NaiveDateTime>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub cancellation_reason: Option<String>,
    pub published_at: Option<NaiveDateTime>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ShareableRecord {
    /// A record belongs to a series when it is a template or an occurrence.
    pub fn is_series_member(&self) -> bool {
        self.parent_record_id.is_some() || self.recurrence_rule.is_some()
    }

    /// Series key: the template id, which is the record's own id for the template.
    pub fn series_id(&self) -> &str {
        self.parent_record_id.as_deref().unwrap_or(&self.id)
    }

    /// Calendar date the occurrence falls on.
    pub fn occurrence_date(&self) -> Option<NaiveDate> {
        self.start_date
            .or_else(|| self.start_time.map(|t| t.date()))
    }

    /// End of a check-in window; `None` for undated windows or out-of-range durations.
    pub fn expires_at(&self) -> Option<NaiveDateTime> {
        let (start, minutes) = (self.start_time?, self.duration_minutes?);
        Duration::try_minutes(minutes).and_then(|d| start.checked_add_signed(d))
    }

    /// Check-ins expire once their window has elapsed. Dated records never do.
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        self.expires_at().map(|end| end <= now).unwrap_or(false)
    }
}

/// Column values for a new row in `shareable_records`.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub tenant_id: String,
    pub kind: RecordKind,
    pub created_by: String,
    pub title: String,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub visibility_scope: VisibilityScope,
    pub status: RecordStatus,
    pub start_time: Option<NaiveDateTime>,
    pub duration_minutes: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub parent_record_id: Option<String>,
    pub recurrence_rule: Option<String>,
    pub max_attendees: Option<i64>,
    pub rsvp_deadline: Option<NaiveDateTime>,
    pub published_at: Option<NaiveDateTime>,
}

/// Field edits that may be propagated across a series. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub max_attendees: Option<i64>,
    pub rsvp_deadline: Option<NaiveDateTime>,
}

impl RecordEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.location_name.is_none()
            && self.max_attendees.is_none()
            && self.rsvp_deadline.is_none()
    }
}
