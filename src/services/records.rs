//! Creation, lifecycle and visibility-filtered reads of shareable records.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngagementConfig;
use crate::db::models::*;
use crate::db::repository::{EngagementRepository, RecordRepository};
use crate::error::{AppError, AppResult};
use crate::services::engagement::{MyResponse, TallyView};
use crate::services::invite_graph::InviteGraph;
use crate::services::privacy::ProfileView;
use crate::services::profiles::ProfileService;
use crate::services::recurrence::RecurrenceRule;
use crate::services::visibility::{
    allows_private_scope, RecordGrants, ScopeChange, ScopeResolver, Viewer,
};
use crate::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewCheckIn {
    pub title: String,
    pub description: Option<String>,
    pub location_name: Option<String>,
    /// Defaults to now.
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    #[serde(default = "ScopeConfig::community")]
    pub scope: ScopeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub location_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub max_attendees: Option<i64>,
    pub rsvp_deadline: Option<DateTime<Utc>>,
    pub recurrence_rule: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default = "ScopeConfig::community")]
    pub scope: ScopeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAnnouncement {
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_publish")]
    pub publish: bool,
    #[serde(default = "ScopeConfig::community")]
    pub scope: ScopeConfig,
}

fn default_publish() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: ShareableRecord,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<ProfileView>,
    pub my_response: Option<MyResponse>,
    pub tally: TallyView,
    /// Grant lists, shown only to those who manage the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeUpdate {
    pub record_id: String,
    pub visibility_scope: VisibilityScope,
    pub change: ScopeChange,
}

// ============================================================================
// Validation
// ============================================================================

fn required_title(title: &str) -> AppResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    Ok(title.to_string())
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validate a check-in against the configured window and return its start time.
pub fn validate_check_in(
    draft: &NewCheckIn,
    now: NaiveDateTime,
    limits: &EngagementConfig,
) -> AppResult<NaiveDateTime> {
    required_title(&draft.title)?;

    let (min, max) = (
        limits.check_in_min_duration_minutes,
        limits.check_in_max_duration_minutes,
    );
    if draft.duration_minutes < min || draft.duration_minutes > max {
        return Err(AppError::Validation(format!(
            "Duration must be between {} and {} minutes",
            min, max
        )));
    }

    let start = draft.start_time.map(|t| t.naive_utc()).unwrap_or(now);
    let lead = limits.check_in_max_start_lead_minutes;
    if start > now + Duration::minutes(lead) {
        return Err(AppError::Validation(format!(
            "A check-in cannot start more than {} minutes from now",
            lead
        )));
    }

    draft.scope.validate()?;
    Ok(start)
}

fn validate_scope_for(kind: RecordKind, scope: &ScopeConfig) -> AppResult<()> {
    if scope.visibility_scope == VisibilityScope::Private && !allows_private_scope(kind) {
        return Err(AppError::Validation(format!(
            "A {} cannot be private",
            kind.as_str()
        )));
    }
    scope.validate()
}

// ============================================================================
// Service
// ============================================================================

pub struct RecordService;

impl RecordService {
    /// Load a record the viewer may see. Missing, foreign-tenant and hidden
    /// records all produce the same `NotFound`.
    pub async fn load_visible(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
    ) -> AppResult<(ShareableRecord, RecordGrants)> {
        let record = RecordRepository::find_in_tenant(&state.db, &viewer.tenant_id, record_id)
            .await?
            .ok_or_else(AppError::record_not_found)?;

        let grants = InviteGraph::grants_for(&state.db, &record.id).await?;
        if !ScopeResolver::is_visible(viewer, &record, &grants) {
            tracing::debug!("Record {} hidden from {}", record.id, viewer.user_id);
            return Err(AppError::record_not_found());
        }

        Ok((record, grants))
    }

    /// Like [`load_visible`](Self::load_visible), then `Forbidden` unless the
    /// viewer manages the record.
    pub async fn load_managed(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
    ) -> AppResult<(ShareableRecord, RecordGrants)> {
        let (record, grants) = Self::load_visible(state, viewer, record_id).await?;
        if !viewer.can_manage(&record) {
            return Err(AppError::Forbidden);
        }
        Ok((record, grants))
    }

    pub async fn get_visible(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
    ) -> AppResult<RecordView> {
        let loaded = Self::load_visible(state, viewer, record_id).await?;
        let mut views = Self::assemble(state, viewer, vec![loaded]).await?;
        views.pop().ok_or_else(AppError::record_not_found)
    }

    /// Feed of records visible to the viewer. Without `include_inactive`,
    /// closed records and elapsed check-ins are left out.
    pub async fn list_visible(
        state: &Arc<AppState>,
        viewer: &Viewer,
        filter: RecordFilter,
    ) -> AppResult<Vec<RecordView>> {
        let now = Utc::now().naive_utc();
        let candidates =
            RecordRepository::list_by_tenant(&state.db, &viewer.tenant_id, filter.kind).await?;

        let candidates: Vec<ShareableRecord> = candidates
            .into_iter()
            .filter(|r| {
                filter.include_inactive
                    || ((r.status.accepts_responses() || r.status == RecordStatus::Draft)
                        && !r.is_expired(now))
            })
            .collect();

        let ids: Vec<String> = candidates.iter().map(|r| r.id.clone()).collect();
        let mut grants = InviteGraph::grants_for_many(&state.db, &ids).await?;

        let total = candidates.len();
        let visible: Vec<(ShareableRecord, RecordGrants)> = candidates
            .into_iter()
            .filter_map(|record| {
                let g = grants.remove(&record.id).unwrap_or_default();
                ScopeResolver::is_visible(viewer, &record, &g).then_some((record, g))
            })
            .collect();

        tracing::debug!(
            "Feed for {}: {} of {} candidate record(s) visible",
            viewer.user_id,
            visible.len(),
            total
        );

        Self::assemble(state, viewer, visible).await
    }

    /// Attach creator profiles, the viewer's own responses and tallies.
    async fn assemble(
        state: &Arc<AppState>,
        viewer: &Viewer,
        records: Vec<(ShareableRecord, RecordGrants)>,
    ) -> AppResult<Vec<RecordView>> {
        let now = Utc::now().naive_utc();
        let ids: Vec<String> = records.iter().map(|(r, _)| r.id.clone()).collect();
        let mut creator_ids: Vec<String> =
            records.iter().map(|(r, _)| r.created_by.clone()).collect();
        creator_ids.sort();
        creator_ids.dedup();

        let (creators, mine, tallies) = futures::try_join!(
            ProfileService::profile_views(state, viewer, &creator_ids),
            EngagementRepository::find_for_user(&state.db, &viewer.user_id, &ids),
            EngagementRepository::tallies(&state.db, &ids),
        )?;

        let mine: HashMap<String, MyResponse> = mine
            .iter()
            .map(|r| (r.occurrence_id.clone(), MyResponse::from(r)))
            .collect();

        Ok(records
            .into_iter()
            .map(|(record, grants)| {
                let manages = viewer.can_manage(&record);
                RecordView {
                    is_expired: record.is_expired(now),
                    series_id: record
                        .is_series_member()
                        .then(|| record.series_id().to_string()),
                    creator: creators.get(&record.created_by).cloned(),
                    my_response: mine.get(&record.id).cloned(),
                    tally: tallies.get(&record.id).copied().unwrap_or_default().into(),
                    scope: manages.then(|| InviteGraph::scope_config(&record, &grants)),
                    record,
                }
            })
            .collect())
    }

    // ========================================================================
    // Creation
    // ========================================================================

    pub async fn create_check_in(
        state: &Arc<AppState>,
        viewer: &Viewer,
        draft: NewCheckIn,
    ) -> AppResult<ShareableRecord> {
        let now = Utc::now().naive_utc();
        let draft = NewCheckIn {
            scope: draft.scope.clone().normalized(),
            ..draft
        };
        let start = validate_check_in(&draft, now, &state.config.engagement)?;

        let new = NewRecord {
            tenant_id: viewer.tenant_id.clone(),
            kind: RecordKind::CheckIn,
            created_by: viewer.user_id.clone(),
            title: required_title(&draft.title)?,
            description: trimmed(&draft.description),
            location_name: trimmed(&draft.location_name),
            visibility_scope: draft.scope.visibility_scope,
            status: RecordStatus::Active,
            start_time: Some(start),
            duration_minutes: Some(draft.duration_minutes),
            start_date: None,
            end_date: None,
            parent_record_id: None,
            recurrence_rule: None,
            max_attendees: None,
            rsvp_deadline: None,
            published_at: None,
        };

        let mut tx = state.db.begin().await.map_err(AppError::transient)?;
        let record = RecordRepository::insert(&mut *tx, &new, now).await?;
        InviteGraph::replace(&mut tx, &record.id, &draft.scope).await?;
        tx.commit().await.map_err(AppError::transient)?;

        tracing::info!(
            "Check-in {} created by {} ({} min, {:?})",
            record.id,
            viewer.user_id,
            draft.duration_minutes,
            record.visibility_scope
        );
        Ok(record)
    }

    /// Create an event, materializing one record per occurrence when a
    /// recurrence rule is given. The first record returned is the template.
    pub async fn create_event(
        state: &Arc<AppState>,
        viewer: &Viewer,
        draft: NewEvent,
    ) -> AppResult<Vec<ShareableRecord>> {
        let title = required_title(&draft.title)?;
        let scope = draft.scope.clone().normalized();
        validate_scope_for(RecordKind::Event, &scope)?;

        let end_date = draft.end_date.unwrap_or(draft.start_date);
        if end_date < draft.start_date {
            return Err(AppError::Validation(
                "End date cannot be before start date".to_string(),
            ));
        }
        if matches!(draft.max_attendees, Some(max) if max < 1) {
            return Err(AppError::Validation(
                "Maximum attendees must be at least 1".to_string(),
            ));
        }

        let rule = draft
            .recurrence_rule
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| RecurrenceRule::parse_bounded(r, state.config.engagement.series_max_occurrences))
            .transpose()?;

        let dates = match &rule {
            Some(rule) => rule.dates_from(draft.start_date),
            None => vec![draft.start_date],
        };
        let span = end_date - draft.start_date;
        let deadline = draft.rsvp_deadline.map(|d| d.naive_utc());

        let now = Utc::now().naive_utc();
        let (status, published_at) = if draft.draft {
            (RecordStatus::Draft, None)
        } else {
            (RecordStatus::Published, Some(now))
        };

        let mut tx = state.db.begin().await.map_err(AppError::transient)?;
        let mut created: Vec<ShareableRecord> = Vec::with_capacity(dates.len());

        for date in dates {
            let offset = date - draft.start_date;
            let end = date
                .checked_add_signed(span)
                .ok_or_else(|| AppError::Validation("Event dates are out of range".to_string()))?;
            let rsvp_deadline = deadline
                .map(|d| {
                    d.checked_add_signed(offset).ok_or_else(|| {
                        AppError::Validation("RSVP deadline is out of range".to_string())
                    })
                })
                .transpose()?;
            let template_id = created.first().map(|t| t.id.clone());
            let new = NewRecord {
                tenant_id: viewer.tenant_id.clone(),
                kind: RecordKind::Event,
                created_by: viewer.user_id.clone(),
                title: title.clone(),
                description: trimmed(&draft.description),
                location_name: trimmed(&draft.location_name),
                visibility_scope: scope.visibility_scope,
                status,
                start_time: None,
                duration_minutes: None,
                start_date: Some(date),
                end_date: Some(end),
                recurrence_rule: match (&template_id, &rule) {
                    (None, Some(rule)) => Some(rule.to_string()),
                    _ => None,
                },
                parent_record_id: template_id,
                max_attendees: draft.max_attendees,
                rsvp_deadline,
                published_at,
            };

            let record = RecordRepository::insert(&mut *tx, &new, now).await?;
            InviteGraph::replace(&mut tx, &record.id, &scope).await?;
            created.push(record);
        }

        tx.commit().await.map_err(AppError::transient)?;

        tracing::info!(
            "Event created by {}: {} occurrence(s)",
            viewer.user_id,
            created.len()
        );
        Ok(created)
    }

    pub async fn create_announcement(
        state: &Arc<AppState>,
        viewer: &Viewer,
        draft: NewAnnouncement,
    ) -> AppResult<ShareableRecord> {
        if !viewer.is_tenant_admin {
            return Err(AppError::Forbidden);
        }

        let title = required_title(&draft.title)?;
        let scope = draft.scope.clone().normalized();
        validate_scope_for(RecordKind::Announcement, &scope)?;

        let now = Utc::now().naive_utc();
        let (status, published_at) = if draft.publish {
            (RecordStatus::Published, Some(now))
        } else {
            (RecordStatus::Draft, None)
        };

        let new = NewRecord {
            tenant_id: viewer.tenant_id.clone(),
            kind: RecordKind::Announcement,
            created_by: viewer.user_id.clone(),
            title,
            description: trimmed(&draft.description),
            location_name: None,
            visibility_scope: scope.visibility_scope,
            status,
            start_time: None,
            duration_minutes: None,
            start_date: None,
            end_date: None,
            parent_record_id: None,
            recurrence_rule: None,
            max_attendees: None,
            rsvp_deadline: None,
            published_at,
        };

        let mut tx = state.db.begin().await.map_err(AppError::transient)?;
        let record = RecordRepository::insert(&mut *tx, &new, now).await?;
        InviteGraph::replace(&mut tx, &record.id, &scope).await?;
        tx.commit().await.map_err(AppError::transient)?;

        tracing::info!("Announcement {} created ({})", record.id, status.as_str());
        Ok(record)
    }

    // ========================================================================
    // Scope and lifecycle
    // ========================================================================

    /// Replace the record's scope and grants. Existing responses are left as they are.
    pub async fn update_scope(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
        scope: ScopeConfig,
    ) -> AppResult<ScopeUpdate> {
        let (record, _) = Self::load_managed(state, viewer, record_id).await?;
        let scope = scope.normalized();
        validate_scope_for(record.kind, &scope)?;

        let now = Utc::now().naive_utc();
        let mut tx = state.db.begin().await.map_err(AppError::transient)?;
        RecordRepository::set_scope(&mut *tx, &record.id, scope.visibility_scope, now).await?;
        InviteGraph::replace(&mut tx, &record.id, &scope).await?;
        tx.commit().await.map_err(AppError::transient)?;

        let change = ScopeChange::classify(record.visibility_scope, scope.visibility_scope);
        tracing::info!(
            "Scope of {} changed {:?} -> {:?} ({:?})",
            record.id,
            record.visibility_scope,
            scope.visibility_scope,
            change
        );

        Ok(ScopeUpdate {
            record_id: record.id,
            visibility_scope: scope.visibility_scope,
            change,
        })
    }

    pub async fn extend_check_in(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
        additional_minutes: i64,
    ) -> AppResult<ShareableRecord> {
        let (record, _) = Self::load_managed(state, viewer, record_id).await?;
        let now = Utc::now().naive_utc();
        Self::ensure_open_check_in(&record, now)?;

        if additional_minutes < 1 {
            return Err(AppError::Validation(
                "Extension must be at least 1 minute".to_string(),
            ));
        }

        let max = state.config.engagement.check_in_max_duration_minutes;
        let extended = record
            .duration_minutes
            .unwrap_or(0)
            .checked_add(additional_minutes)
            .filter(|total| *total <= max);
        let Some(extended) = extended else {
            return Err(AppError::Validation(format!(
                "A check-in cannot last more than {} minutes",
                max
            )));
        };

        RecordRepository::set_duration(&state.db, &record.id, extended, now).await
    }

    pub async fn end_check_in(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
    ) -> AppResult<ShareableRecord> {
        let (record, _) = Self::load_managed(state, viewer, record_id).await?;
        let now = Utc::now().naive_utc();
        Self::ensure_open_check_in(&record, now)?;

        let ended =
            RecordRepository::set_status(&state.db, &record.id, RecordStatus::Ended, None, now)
                .await?;
        tracing::info!("Check-in {} ended early", record.id);
        Ok(ended)
    }

    fn ensure_open_check_in(record: &ShareableRecord, now: NaiveDateTime) -> AppResult<()> {
        if record.kind != RecordKind::CheckIn {
            return Err(AppError::Validation("Record is not a check-in".to_string()));
        }
        if record.status != RecordStatus::Active || record.is_expired(now) {
            return Err(AppError::Validation("Check-in has already ended".to_string()));
        }
        Ok(())
    }

    pub async fn publish_announcement(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
    ) -> AppResult<ShareableRecord> {
        Self::transition_announcement(
            state,
            viewer,
            record_id,
            &[RecordStatus::Draft, RecordStatus::Archived],
            RecordStatus::Published,
        )
        .await
    }

    pub async fn archive_announcement(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
    ) -> AppResult<ShareableRecord> {
        Self::transition_announcement(
            state,
            viewer,
            record_id,
            &[RecordStatus::Draft, RecordStatus::Published],
            RecordStatus::Archived,
        )
        .await
    }

    async fn transition_announcement(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
        from: &[RecordStatus],
        to: RecordStatus,
    ) -> AppResult<ShareableRecord> {
        let (record, _) = Self::load_managed(state, viewer, record_id).await?;
        if record.kind != RecordKind::Announcement {
            return Err(AppError::Validation(
                "Record is not an announcement".to_string(),
            ));
        }
        if !from.contains(&record.status) {
            return Err(AppError::Validation(format!(
                "Announcement is already {}",
                record.status.as_str()
            )));
        }

        let now = Utc::now().naive_utc();
        let updated = RecordRepository::set_status(&state.db, &record.id, to, None, now).await?;
        tracing::info!("Announcement {} is now {}", record.id, to.as_str());
        Ok(updated)
    }

    /// Delete a record; grants and responses cascade with it. Other members of
    /// a series keep their series key.
    pub async fn delete_record(
        state: &Arc<AppState>,
        viewer: &Viewer,
        record_id: &str,
    ) -> AppResult<()> {
        let (record, _) = Self::load_managed(state, viewer, record_id).await?;
        if !RecordRepository::delete(&state.db, &record.id).await? {
            return Err(AppError::record_not_found());
        }
        tracing::info!("Record {} deleted by {}", record.id, viewer.user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::GrantRepository;
    use crate::test_support::*;
    use tokio_test::assert_ok;

    fn check_in(duration_minutes: i64, start_time: Option<DateTime<Utc>>) -> NewCheckIn {
        NewCheckIn {
            title: "Coffee at the clubhouse".into(),
            description: None,
            location_name: Some("Clubhouse".into()),
            start_time,
            duration_minutes,
            scope: ScopeConfig::community(),
        }
    }

    #[test]
    fn duration_boundaries() {
        let now = Utc::now().naive_utc();
        let limits = EngagementConfig::default();

        assert_ok!(validate_check_in(&check_in(30, None), now, &limits));
        assert_ok!(validate_check_in(&check_in(480, None), now, &limits));
        for bad in [29, 481, 0] {
            assert!(matches!(
                validate_check_in(&check_in(bad, None), now, &limits),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn start_time_lead_boundaries() {
        let now = Utc::now();
        let limits = EngagementConfig::default();

        let soon = check_in(30, Some(now + Duration::minutes(59)));
        let too_far = check_in(30, Some(now + Duration::minutes(61)));
        let earlier = check_in(30, Some(now - Duration::minutes(15)));

        assert_ok!(validate_check_in(&soon, now.naive_utc(), &limits));
        assert_ok!(validate_check_in(&earlier, now.naive_utc(), &limits));
        assert!(matches!(
            validate_check_in(&too_far, now.naive_utc(), &limits),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn blank_titles_are_rejected() {
        let mut draft = check_in(60, None);
        draft.title = "   ".into();
        assert!(validate_check_in(&draft, Utc::now().naive_utc(), &EngagementConfig::default()).is_err());
    }

    #[tokio::test]
    async fn check_in_duration_is_enforced_end_to_end() {
        let state = test_state().await;
        let c = seed_community(&state).await;

        let ok = RecordService::create_check_in(&state, &c.alice, check_in(30, None))
            .await
            .expect("30 minutes is allowed");
        assert_eq!(ok.duration_minutes, Some(30));
        assert_eq!(ok.status, RecordStatus::Active);

        let err = RecordService::create_check_in(&state, &c.alice, check_in(29, None))
            .await
            .expect_err("29 minutes is too short");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn hidden_and_missing_records_are_indistinguishable() {
        let state = test_state().await;
        let c = seed_community(&state).await;

        let mut draft = check_in(60, None);
        draft.scope = private_scope(&[&c.bob.user_id]);
        let private = RecordService::create_check_in(&state, &c.alice, draft)
            .await
            .expect("create");

        let hidden = RecordService::get_visible(&state, &c.carol, &private.id)
            .await
            .expect_err("carol is not invited");
        let missing = RecordService::get_visible(&state, &c.carol, "does-not-exist")
            .await
            .expect_err("nothing there");

        assert_eq!(hidden.code(), missing.code());
        assert_eq!(hidden.to_string(), missing.to_string());

        assert_ok!(RecordService::get_visible(&state, &c.bob, &private.id).await);
        assert_ok!(RecordService::get_visible(&state, &c.alice, &private.id).await);
    }

    #[tokio::test]
    async fn family_invites_reach_every_member() {
        let state = test_state().await;
        let c = seed_community(&state).await;

        let mut draft = check_in(45, None);
        draft.scope = ScopeConfig {
            visibility_scope: VisibilityScope::Private,
            family_unit_ids: vec![c.jones_family.clone()],
            ..ScopeConfig::community()
        };
        let record = RecordService::create_check_in(&state, &c.alice, draft)
            .await
            .expect("create");

        assert_ok!(RecordService::get_visible(&state, &c.carol, &record.id).await);
        assert!(RecordService::get_visible(&state, &c.bob, &record.id).await.is_err());
    }

    #[tokio::test]
    async fn feed_filters_by_neighborhood_and_attaches_tallies() {
        let state = test_state().await;
        let c = seed_community(&state).await;

        let north_only = seed_event(&state, &c.admin, "North pool party", neighborhood_scope(&[&c.north])).await;
        let everyone = seed_event(&state, &c.admin, "Town hall", community_scope()).await;

        crate::services::engagement::EngagementLedger::upsert_response(
            &state,
            &c.alice,
            &everyone.id,
            RsvpStatus::Yes,
            2,
        )
        .await
        .expect("rsvp");

        let alice_feed = RecordService::list_visible(&state, &c.alice, RecordFilter::default())
            .await
            .expect("feed");
        let carol_feed = RecordService::list_visible(&state, &c.carol, RecordFilter::default())
            .await
            .expect("feed");

        let ids = |feed: &[RecordView]| feed.iter().map(|v| v.record.id.clone()).collect::<Vec<_>>();
        assert!(ids(&alice_feed).contains(&north_only.id));
        assert!(!ids(&carol_feed).contains(&north_only.id));
        assert!(ids(&carol_feed).contains(&everyone.id));

        let town_hall = alice_feed
            .iter()
            .find(|v| v.record.id == everyone.id)
            .expect("in feed");
        assert_eq!(town_hall.tally.attending, 2);
        assert_eq!(
            town_hall.my_response.as_ref().map(|r| r.status),
            Some(RsvpStatus::Yes)
        );
        assert!(town_hall.scope.is_none());
        assert!(town_hall.creator.is_some());
    }

    #[tokio::test]
    async fn ended_check_ins_leave_the_active_feed() {
        let state = test_state().await;
        let c = seed_community(&state).await;
        let record = RecordService::create_check_in(&state, &c.alice, check_in(60, None))
            .await
            .expect("create");

        RecordService::end_check_in(&state, &c.alice, &record.id)
            .await
            .expect("end");

        let active = RecordService::list_visible(&state, &c.bob, RecordFilter::default())
            .await
            .expect("feed");
        assert!(active.iter().all(|v| v.record.id != record.id));

        let all = RecordService::list_visible(
            &state,
            &c.bob,
            RecordFilter {
                kind: Some(RecordKind::CheckIn),
                include_inactive: true,
            },
        )
        .await
        .expect("feed");
        let ended = all.iter().find(|v| v.record.id == record.id).expect("listed");
        assert_eq!(ended.record.status, RecordStatus::Ended);
        assert!(ended.record.ended_at.is_some());
    }

    #[tokio::test]
    async fn extension_is_capped() {
        let state = test_state().await;
        let c = seed_community(&state).await;
        let record = RecordService::create_check_in(&state, &c.alice, check_in(400, None))
            .await
            .expect("create");

        let extended = RecordService::extend_check_in(&state, &c.alice, &record.id, 80)
            .await
            .expect("to the cap");
        assert_eq!(extended.duration_minutes, Some(480));

        assert!(RecordService::extend_check_in(&state, &c.alice, &record.id, 1)
            .await
            .is_err());
        assert!(matches!(
            RecordService::extend_check_in(&state, &c.bob, &record.id, 10).await,
            Err(AppError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn overflowing_extension_is_rejected_and_feed_still_loads() {
        let state = test_state().await;
        let c = seed_community(&state).await;
        let record = RecordService::create_check_in(&state, &c.alice, check_in(60, None))
            .await
            .expect("create");

        assert!(matches!(
            RecordService::extend_check_in(&state, &c.alice, &record.id, i64::MAX).await,
            Err(AppError::Validation(_))
        ));

        let feed = RecordService::list_visible(&state, &c.bob, RecordFilter::default())
            .await
            .expect("feed");
        let listed = feed.iter().find(|v| v.record.id == record.id).expect("listed");
        assert_eq!(listed.record.duration_minutes, Some(60));
    }

    #[tokio::test]
    async fn out_of_range_series_deadline_is_rejected() {
        let state = test_state().await;
        let c = seed_community(&state).await;
        let start = (Utc::now() + Duration::days(7)).date_naive();

        let err = RecordService::create_event(
            &state,
            &c.alice,
            NewEvent {
                title: "Night market".into(),
                description: None,
                location_name: None,
                start_date: start,
                end_date: None,
                max_attendees: None,
                rsvp_deadline: Some(DateTime::<Utc>::MAX_UTC),
                recurrence_rule: Some("FREQ=DAILY;INTERVAL=1;COUNT=2".into()),
                draft: false,
                scope: ScopeConfig::community(),
            },
        )
        .await
        .expect_err("deadline overflows on the second day");
        assert!(matches!(err, AppError::Validation(_)));

        let feed = RecordService::list_visible(&state, &c.alice, RecordFilter::default())
            .await
            .expect("feed");
        assert!(feed.iter().all(|v| v.record.title != "Night market"));
    }

    #[tokio::test]
    async fn scope_updates_replace_grants_and_report_direction() {
        let state = test_state().await;
        let c = seed_community(&state).await;
        let event = seed_event(&state, &c.alice, "Yard sale", neighborhood_scope(&[&c.north, &c.south])).await;

        let narrowed = RecordService::update_scope(
            &state,
            &c.alice,
            &event.id,
            private_scope(&[&c.bob.user_id]),
        )
        .await
        .expect("narrow");
        assert_eq!(narrowed.change, ScopeChange::Reducing);

        let ids = [event.id.clone()];
        let neighborhoods = GrantRepository::neighborhoods_for(&state.db, &ids)
            .await
            .expect("grants");
        let invites = GrantRepository::invites_for(&state.db, &ids)
            .await
            .expect("invites");
        assert!(neighborhoods.is_empty());
        assert_eq!(invites.len(), 1);

        let widened = RecordService::update_scope(&state, &c.alice, &event.id, community_scope())
            .await
            .expect("widen");
        assert_eq!(widened.change, ScopeChange::Expanding);

        let invalid = RecordService::update_scope(
            &state,
            &c.alice,
            &event.id,
            ScopeConfig {
                visibility_scope: VisibilityScope::Neighborhood,
                ..ScopeConfig::community()
            },
        )
        .await
        .expect_err("no neighborhoods");
        assert!(matches!(invalid, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn recurring_events_link_occurrences_to_the_template() {
        let state = test_state().await;
        let c = seed_community(&state).await;
        let series = seed_series(&state, &c.alice, "Tai chi", 4).await;

        assert_eq!(series.len(), 4);
        assert!(series[0].recurrence_rule.is_some());
        assert!(series[0].parent_record_id.is_none());
        for occurrence in &series[1..] {
            assert_eq!(occurrence.parent_record_id.as_deref(), Some(series[0].id.as_str()));
            assert_eq!(occurrence.series_id(), series[0].id);
        }
    }

    #[tokio::test]
    async fn announcements_are_admin_only_and_never_private() {
        let state = test_state().await;
        let c = seed_community(&state).await;

        let draft = NewAnnouncement {
            title: "Water shut-off".into(),
            description: Some("Tuesday 9-11am".into()),
            publish: false,
            scope: community_scope(),
        };

        assert!(matches!(
            RecordService::create_announcement(&state, &c.alice, draft.clone()).await,
            Err(AppError::Forbidden)
        ));

        let private = NewAnnouncement {
            scope: private_scope(&[&c.bob.user_id]),
            ..draft.clone()
        };
        assert!(matches!(
            RecordService::create_announcement(&state, &c.admin, private).await,
            Err(AppError::Validation(_))
        ));

        let created = RecordService::create_announcement(&state, &c.admin, draft)
            .await
            .expect("create");
        assert_eq!(created.status, RecordStatus::Draft);
        assert!(RecordService::get_visible(&state, &c.alice, &created.id).await.is_err());

        let published = RecordService::publish_announcement(&state, &c.admin, &created.id)
            .await
            .expect("publish");
        assert!(published.published_at.is_some());
        assert_ok!(RecordService::get_visible(&state, &c.alice, &created.id).await);

        let archived = RecordService::archive_announcement(&state, &c.admin, &created.id)
            .await
            .expect("archive");
        assert_eq!(archived.status, RecordStatus::Archived);
    }

    #[tokio::test]
    async fn deleting_a_record_cascades() {
        let state = test_state().await;
        let c = seed_community(&state).await;
        let event = seed_event(&state, &c.alice, "Cleanup", neighborhood_scope(&[&c.north])).await;
        crate::services::engagement::EngagementLedger::upsert_response(
            &state,
            &c.alice,
            &event.id,
            RsvpStatus::Yes,
            1,
        )
        .await
        .expect("rsvp");

        assert!(matches!(
            RecordService::delete_record(&state, &c.bob, &event.id).await,
            Err(AppError::Forbidden) | Err(AppError::NotFound(_))
        ));
        RecordService::delete_record(&state, &c.alice, &event.id)
            .await
            .expect("delete");

        let ids = [event.id.clone()];
        assert!(GrantRepository::neighborhoods_for(&state.db, &ids)
            .await
            .expect("grants")
            .is_empty());
        assert!(EngagementRepository::find(&state.db, &event.id, &c.alice.user_id)
            .await
            .expect("lookup")
            .is_none());
    }
}
