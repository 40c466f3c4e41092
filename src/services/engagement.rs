//! RSVP and attendance responses for single occurrences.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::*;
use crate::db::repository::EngagementRepository;
use crate::error::{AppError, AppResult};
use crate::services::profiles::ProfileService;
use crate::services::privacy::ProfileView;
use crate::services::records::RecordService;
use crate::services::series::SeriesScope;
use crate::services::visibility::Viewer;
use crate::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// An explicit RSVP intent. `status: None` clears the caller's response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpRequest {
    #[serde(default)]
    pub status: Option<RsvpStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attending_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<SeriesScope>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyView {
    pub yes: i64,
    pub maybe: i64,
    pub no: i64,
    pub attending: i64,
}

impl From<RsvpTally> for TallyView {
    fn from(t: RsvpTally) -> Self {
        TallyView {
            yes: t.yes,
            maybe: t.maybe,
            no: t.no,
            attending: t.attending(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyResponse {
    pub status: RsvpStatus,
    pub attending_count: i64,
}

impl From<&EngagementRecord> for MyResponse {
    fn from(r: &EngagementRecord) -> Self {
        MyResponse {
            status: r.status,
            attending_count: r.attending_count,
        }
    }
}

/// Server-confirmed result of an RSVP, for one occurrence or a series slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpOutcome {
    pub occurrence_id: String,
    pub status: Option<RsvpStatus>,
    pub attending_count: Option<i64>,
    pub scope: SeriesScope,
    pub series_id: Option<String>,
    pub effective_from: Option<NaiveDate>,
    pub applied_to: Vec<String>,
    pub tally: TallyView,
}

#[derive(Debug, Clone, Serialize)]
pub struct Responder {
    pub user_id: String,
    pub attending_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resident: Option<ProfileView>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponsesView {
    pub yes: Vec<Responder>,
    pub maybe: Vec<Responder>,
    pub no: Vec<Responder>,
}

// ============================================================================
// Ledger
// ============================================================================

pub struct EngagementLedger;

impl EngagementLedger {
    /// Reject responses on records that are closed, expired or past their deadline.
    pub fn ensure_accepts(record: &ShareableRecord, now: NaiveDateTime) -> AppResult<()> {
        if !record.status.accepts_responses() {
            return Err(AppError::Validation(format!(
                "This {} is no longer accepting responses",
                record.kind.as_str().replace('_', "-")
            )));
        }
        if record.is_expired(now) {
            return Err(AppError::Validation("This check-in has ended".to_string()));
        }
        if let Some(deadline) = record.rsvp_deadline {
            if now > deadline {
                return Err(AppError::Validation(
                    "The RSVP deadline has passed".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn validate_attending_count(count: i64) -> AppResult<()> {
        if count < 1 {
            return Err(AppError::Validation(
                "Attending count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// True when a `yes` of `attending_count` fits next to everyone else's.
    pub fn fits_capacity(record: &ShareableRecord, others_yes: i64, attending_count: i64) -> bool {
        match record.max_attendees {
            Some(max) => others_yes + attending_count <= max,
            None => true,
        }
    }

    /// Idempotent upsert of the viewer's response on one occurrence.
    pub async fn upsert_response(
        state: &Arc<AppState>,
        viewer: &Viewer,
        occurrence_id: &str,
        status: RsvpStatus,
        attending_count: i64,
    ) -> AppResult<EngagementRecord> {
        let (record, _) = RecordService::load_visible(state, viewer, occurrence_id).await?;
        let now = Utc::now().naive_utc();

        Self::ensure_accepts(&record, now)?;
        Self::validate_attending_count(attending_count)?;

        // Write first: the transaction holds SQLite's write lock before the
        // capacity read, so concurrent "yes" responses are checked one at a time.
        let mut tx = state.db.begin().await.map_err(AppError::transient)?;
        let saved = EngagementRepository::upsert(
            &mut *tx,
            &ResponseUpsert {
                occurrence_id: record.id.clone(),
                user_id: viewer.user_id.clone(),
                tenant_id: viewer.tenant_id.clone(),
                status,
                attending_count,
            },
            now,
        )
        .await?;

        if status == RsvpStatus::Yes && record.max_attendees.is_some() {
            let others =
                EngagementRepository::yes_total_excluding(&mut *tx, &record.id, &viewer.user_id)
                    .await?;
            if !Self::fits_capacity(&record, others, attending_count) {
                tx.rollback().await.map_err(AppError::transient)?;
                return Err(AppError::Validation("This event is full".to_string()));
            }
        }
        tx.commit().await.map_err(AppError::transient)?;

        tracing::debug!(
            "Response {} x{} recorded for {} on {}",
            status.as_str(),
            attending_count,
            viewer.user_id,
            record.id
        );
        Ok(saved)
    }

    /// Remove the viewer's response. Clearing an absent response is not an error.
    pub async fn clear_response(
        state: &Arc<AppState>,
        viewer: &Viewer,
        occurrence_id: &str,
    ) -> AppResult<bool> {
        let (record, _) = RecordService::load_visible(state, viewer, occurrence_id).await?;
        let removed = EngagementRepository::delete(&state.db, &record.id, &viewer.user_id).await?;
        tracing::debug!("Response cleared for {} on {}", viewer.user_id, record.id);
        Ok(removed)
    }

    pub async fn tally(
        state: &Arc<AppState>,
        viewer: &Viewer,
        occurrence_id: &str,
    ) -> AppResult<TallyView> {
        let (record, _) = RecordService::load_visible(state, viewer, occurrence_id).await?;
        let tally = EngagementRepository::tally(&state.db, &record.id).await?;
        Ok(tally.into())
    }

    /// Responders grouped by status, each with their profile as the viewer may see it.
    pub async fn responses(
        state: &Arc<AppState>,
        viewer: &Viewer,
        occurrence_id: &str,
    ) -> AppResult<ResponsesView> {
        let (record, _) = RecordService::load_visible(state, viewer, occurrence_id).await?;
        let rows = EngagementRepository::list_responses(&state.db, &record.id).await?;

        let user_ids: Vec<String> = rows.iter().map(|r| r.user_id.clone()).collect();
        let mut profiles: HashMap<String, ProfileView> =
            ProfileService::profile_views(state, viewer, &user_ids).await?;

        let mut view = ResponsesView::default();
        for row in rows {
            let responder = Responder {
                resident: profiles.remove(&row.user_id),
                user_id: row.user_id,
                attending_count: row.attending_count,
            };
            match row.status {
                RsvpStatus::Yes => view.yes.push(responder),
                RsvpStatus::Maybe => view.maybe.push(responder),
                RsvpStatus::No => view.no.push(responder),
            }
        }
        Ok(view)
    }
}
