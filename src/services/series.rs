//! Series-aware RSVPs, edits and cancellations.
//!
//! A series is keyed by its template id (`parent_record_id`, or the record's
//! own id for the template). Series-scoped changes reach the anchor occurrence
//! and every later one, never earlier occurrences.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::*;
use crate::db::repository::{EngagementRepository, RecordRepository};
use crate::error::{AppError, AppResult};
use crate::services::engagement::{EngagementLedger, RsvpOutcome, RsvpRequest};
use crate::services::invite_graph::InviteGraph;
use crate::services::records::RecordService;
use crate::services::visibility::{ScopeResolver, Viewer};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesScope {
    This,
    Series,
}

/// Two-step scope choice for changes to a record that may belong to a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFlow {
    Unscoped,
    AwaitingScopeChoice,
    Applied(SeriesScope),
}

impl ScopeFlow {
    /// Look at the target record. Standalone records need no choice.
    pub fn target(self, record: &ShareableRecord) -> Self {
        match self {
            ScopeFlow::Unscoped if record.is_series_member() => ScopeFlow::AwaitingScopeChoice,
            ScopeFlow::Unscoped => ScopeFlow::Applied(SeriesScope::This),
            other => other,
        }
    }

    /// Record the caller's choice. An applied scope is final.
    pub fn choose(self, scope: SeriesScope) -> Self {
        match self {
            ScopeFlow::Unscoped | ScopeFlow::AwaitingScopeChoice => ScopeFlow::Applied(scope),
            applied => applied,
        }
    }

    pub fn applied(self) -> Option<SeriesScope> {
        match self {
            ScopeFlow::Applied(scope) => Some(scope),
            _ => None,
        }
    }

    /// Run the flow for one request; a series member without a choice is a conflict.
    pub fn resolve(record: &ShareableRecord, requested: Option<SeriesScope>) -> AppResult<SeriesScope> {
        let mut flow = ScopeFlow::Unscoped.target(record);
        if let Some(scope) = requested {
            flow = flow.choose(scope);
        }
        flow.applied().ok_or_else(|| {
            AppError::Conflict(
                "This record is part of a series: choose \"this\" or \"series\"".to_string(),
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesChangeOutcome {
    pub scope: SeriesScope,
    pub series_id: String,
    pub effective_from: Option<NaiveDate>,
    pub applied_to: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
    /// Reinstate previously cancelled occurrences instead.
    #[serde(default)]
    pub uncancel: bool,
}

pub struct SeriesCoordinator;

impl SeriesCoordinator {
    /// Occurrences a change reaches: the anchor alone, or the anchor and every
    /// later member of its series.
    async fn targets(
        state: &Arc<AppState>,
        anchor: &ShareableRecord,
        scope: SeriesScope,
    ) -> AppResult<Vec<ShareableRecord>> {
        if scope == SeriesScope::This {
            return Ok(vec![anchor.clone()]);
        }

        let Some(from) = anchor.occurrence_date() else {
            return Ok(vec![anchor.clone()]);
        };

        let mut members =
            RecordRepository::list_series_from(&state.db, &anchor.tenant_id, anchor.series_id(), from)
                .await?;
        if !members.iter().any(|m| m.id == anchor.id) {
            members.insert(0, anchor.clone());
        }
        Ok(members)
    }

    pub async fn rsvp(
        state: &Arc<AppState>,
        viewer: &Viewer,
        occurrence_id: &str,
        request: RsvpRequest,
    ) -> AppResult<RsvpOutcome> {
        let (anchor, _) = RecordService::load_visible(state, viewer, occurrence_id).await?;
        let scope = ScopeFlow::resolve(&anchor, request.scope)?;
        let attending_count = request.attending_count.unwrap_or(1);
        let series_id = anchor
            .is_series_member()
            .then(|| anchor.series_id().to_string());

        let applied_to = match scope {
            SeriesScope::This => {
                match request.status {
                    Some(status) => {
                        EngagementLedger::upsert_response(
                            state,
                            viewer,
                            &anchor.id,
                            status,
                            attending_count,
                        )
                        .await?;
                    }
                    None => {
                        EngagementLedger::clear_response(state, viewer, &anchor.id).await?;
                    }
                }
                vec![anchor.id.clone()]
            }
            SeriesScope::Series => {
                Self::rsvp_series(state, viewer, &anchor, request.status, attending_count).await?
            }
        };

        let tally = EngagementRepository::tally(&state.db, &anchor.id).await?;

        Ok(RsvpOutcome {
            occurrence_id: anchor.id.clone(),
            status: request.status,
            attending_count: request.status.map(|_| attending_count),
            scope,
            series_id,
            effective_from: match scope {
                SeriesScope::Series => anchor.occurrence_date(),
                SeriesScope::This => None,
            },
            applied_to,
            tally: tally.into(),
        })
    }

    /// One transaction, one batch statement. Later occurrences the viewer cannot
    /// see, or that no longer accept responses, are skipped; the anchor must accept.
    async fn rsvp_series(
        state: &Arc<AppState>,
        viewer: &Viewer,
        anchor: &ShareableRecord,
        status: Option<RsvpStatus>,
        attending_count: i64,
    ) -> AppResult<Vec<String>> {
        let now = Utc::now().naive_utc();
        if status.is_some() {
            EngagementLedger::ensure_accepts(anchor, now)?;
            EngagementLedger::validate_attending_count(attending_count)?;
        }

        let members = Self::targets(state, anchor, SeriesScope::Series).await?;
        let ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
        let grants = InviteGraph::grants_for_many(&state.db, &ids).await?;

        let candidates: Vec<ShareableRecord> = members
            .into_iter()
            .filter(|m| {
                let visible = grants
                    .get(&m.id)
                    .map(|g| ScopeResolver::is_visible(viewer, m, g))
                    .unwrap_or(false);
                if !visible {
                    tracing::debug!("Series RSVP skips hidden occurrence {}", m.id);
                }
                visible
            })
            .filter(|m| {
                status.is_none()
                    || m.id == anchor.id
                    || EngagementLedger::ensure_accepts(m, now).is_ok()
            })
            .collect();

        let mut tx = state.db.begin().await.map_err(AppError::transient)?;

        let applied = match status {
            Some(status) => {
                let mut rows = Vec::with_capacity(candidates.len());
                for member in &candidates {
                    if status == RsvpStatus::Yes && member.max_attendees.is_some() {
                        let others = EngagementRepository::yes_total_excluding(
                            &mut *tx,
                            &member.id,
                            &viewer.user_id,
                        )
                        .await?;
                        if !EngagementLedger::fits_capacity(member, others, attending_count) {
                            if member.id == anchor.id {
                                return Err(AppError::Validation("This event is full".to_string()));
                            }
                            tracing::debug!("Series RSVP skips full occurrence {}", member.id);
                            continue;
                        }
                    }
                    rows.push(ResponseUpsert {
                        occurrence_id: member.id.clone(),
                        user_id: viewer.user_id.clone(),
                        tenant_id: viewer.tenant_id.clone(),
                        status,
                        attending_count,
                    });
                }
                EngagementRepository::upsert_batch(&mut tx, &rows, now).await?;
                rows.into_iter().map(|r| r.occurrence_id).collect::<Vec<_>>()
            }
            None => {
                let ids: Vec<String> = candidates.iter().map(|m| m.id.clone()).collect();
                EngagementRepository::delete_batch(&mut tx, &ids, &viewer.user_id).await?;
                ids
            }
        };

        tx.commit().await.map_err(AppError::transient)?;

        tracing::info!(
            "Series RSVP {} applied to {} occurrence(s) of {} for {}",
            status.map(RsvpStatus::as_str).unwrap_or("clear"),
            applied.len(),
            anchor.series_id(),
            viewer.user_id
        );
        Ok(applied)
    }

    /// Field edits across the resolved occurrences the viewer manages.
    pub async fn edit(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
        edit: RecordEdit,
        requested: Option<SeriesScope>,
    ) -> AppResult<SeriesChangeOutcome> {
        if edit.is_empty() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        if matches!(edit.title.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(AppError::Validation("Title cannot be empty".to_string()));
        }
        if matches!(edit.max_attendees, Some(max) if max < 1) {
            return Err(AppError::Validation(
                "Maximum attendees must be at least 1".to_string(),
            ));
        }

        let (anchor, _) = RecordService::load_managed(state, viewer, record_id).await?;
        let scope = ScopeFlow::resolve(&anchor, requested)?;
        let targets: Vec<ShareableRecord> = Self::targets(state, &anchor, scope)
            .await?
            .into_iter()
            .filter(|t| viewer.can_manage(t))
            .collect();

        let edit = RecordEdit {
            title: edit.title.map(|t| t.trim().to_string()),
            ..edit
        };

        let now = Utc::now().naive_utc();
        let mut tx = state.db.begin().await.map_err(AppError::transient)?;
        for target in &targets {
            let shifted = Self::shift_for(&edit, &anchor, target)?;
            RecordRepository::apply_edit(&mut *tx, &target.id, &shifted, now).await?;
        }
        tx.commit().await.map_err(AppError::transient)?;

        Ok(Self::outcome(&anchor, scope, &targets))
    }

    /// The edit as it lands on `target`: a deadline keeps its distance from the
    /// occurrence date, the way occurrences are materialized.
    fn shift_for(
        edit: &RecordEdit,
        anchor: &ShareableRecord,
        target: &ShareableRecord,
    ) -> AppResult<RecordEdit> {
        let offset = match (anchor.occurrence_date(), target.occurrence_date()) {
            (Some(from), Some(to)) => to - from,
            _ => Duration::zero(),
        };
        let rsvp_deadline = edit
            .rsvp_deadline
            .map(|d| {
                d.checked_add_signed(offset).ok_or_else(|| {
                    AppError::Validation("RSVP deadline is out of range".to_string())
                })
            })
            .transpose()?;
        Ok(RecordEdit {
            rsvp_deadline,
            ..edit.clone()
        })
    }

    /// Cancel, or reinstate, event occurrences.
    pub async fn cancel(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
        request: CancelRequest,
        requested: Option<SeriesScope>,
    ) -> AppResult<SeriesChangeOutcome> {
        let (anchor, _) = RecordService::load_managed(state, viewer, record_id).await?;
        if anchor.kind != RecordKind::Event {
            return Err(AppError::Validation("Only events can be cancelled".to_string()));
        }

        let scope = ScopeFlow::resolve(&anchor, requested)?;
        let (from_status, to_status) = if request.uncancel {
            (RecordStatus::Cancelled, RecordStatus::Published)
        } else {
            (RecordStatus::Published, RecordStatus::Cancelled)
        };
        if anchor.status != from_status {
            return Err(AppError::Validation(format!(
                "Event is {}, expected {}",
                anchor.status.as_str(),
                from_status.as_str()
            )));
        }

        let targets: Vec<ShareableRecord> = Self::targets(state, &anchor, scope)
            .await?
            .into_iter()
            .filter(|t| viewer.can_manage(t) && t.status == from_status)
            .collect();

        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let now = Utc::now().naive_utc();
        let mut tx = state.db.begin().await.map_err(AppError::transient)?;
        for target in &targets {
            RecordRepository::set_status(&mut *tx, &target.id, to_status, reason, now).await?;
        }
        tx.commit().await.map_err(AppError::transient)?;

        tracing::info!(
            "{} {} occurrence(s) of {}",
            if request.uncancel { "Reinstated" } else { "Cancelled" },
            targets.len(),
            anchor.series_id()
        );
        Ok(Self::outcome(&anchor, scope, &targets))
    }

    fn outcome(
        anchor: &ShareableRecord,
        scope: SeriesScope,
        targets: &[ShareableRecord],
    ) -> SeriesChangeOutcome {
        SeriesChangeOutcome {
            scope,
            series_id: anchor.series_id().to_string(),
            effective_from: anchor.occurrence_date(),
            applied_to: targets.iter().map(|t| t.id.clone()).collect(),
        }
    }
}
