//! Client-side optimistic RSVP state shared by widgets on one page.
//!
//! Each [`RsvpWidget`] keeps its own copy of an occurrence's status. A tap is
//! shown immediately, written through an [`RsvpWriter`], then committed or
//! rolled back. Confirmed series-wide changes are broadcast on the
//! [`SyncBus`] and folded into sibling widgets by [`reduce_local_state`].

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::db::models::RsvpStatus;
use crate::error::{AppError, AppResult};
use crate::services::engagement::{RsvpOutcome, RsvpRequest};
use crate::services::series::SeriesScope;

/// A confirmed series-scoped RSVP change. `applied_to` lists the occurrences
/// the server wrote; skipped ones keep their previous status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRsvpSynced {
    pub series_id: String,
    pub effective_from: NaiveDate,
    pub new_status: Option<RsvpStatus>,
    pub applied_to: Vec<String>,
}

/// Same-page, best-effort broadcast. Nothing is persisted or replayed.
#[derive(Debug, Clone)]
pub struct SyncBus {
    tx: broadcast::Sender<SeriesRsvpSynced>,
}

impl SyncBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        SyncBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeriesRsvpSynced> {
        self.tx.subscribe()
    }

    /// Returns how many widgets received the event.
    pub fn publish(&self, event: SeriesRsvpSynced) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                tracing::debug!("Sync event dropped: no widgets subscribed");
                0
            }
        }
    }
}

/// What one widget displays for one occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceState {
    pub occurrence_id: String,
    pub series_id: Option<String>,
    pub occurrence_date: NaiveDate,
    pub status: Option<RsvpStatus>,
}

/// Apply a broadcast to a widget's local state. Only occurrences of the same
/// series, on or after the effective date, that the server actually wrote change.
pub fn reduce_local_state(current: &OccurrenceState, event: &SeriesRsvpSynced) -> OccurrenceState {
    let same_series = current.series_id.as_deref() == Some(event.series_id.as_str());
    let written = event.applied_to.contains(&current.occurrence_id);
    if same_series && written && current.occurrence_date >= event.effective_from {
        OccurrenceState {
            status: event.new_status,
            ..current.clone()
        }
    } else {
        current.clone()
    }
}

/// Authoritative write path used by widgets.
#[async_trait]
pub trait RsvpWriter: Send + Sync {
    async fn write_rsvp(&self, occurrence_id: &str, request: &RsvpRequest) -> AppResult<RsvpOutcome>;
}

pub struct RsvpWidget {
    name: String,
    state: OccurrenceState,
    confirmed: Option<RsvpStatus>,
    last_error: Option<String>,
    events: broadcast::Receiver<SeriesRsvpSynced>,
}

impl RsvpWidget {
    pub fn new(name: impl Into<String>, state: OccurrenceState, bus: &SyncBus) -> Self {
        RsvpWidget {
            name: name.into(),
            confirmed: state.status,
            state,
            last_error: None,
            events: bus.subscribe(),
        }
    }

    pub fn state(&self) -> &OccurrenceState {
        &self.state
    }

    pub fn status(&self) -> Option<RsvpStatus> {
        self.state.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Tapping the active status clears it.
    pub fn resolve_tap(&self, tapped: RsvpStatus) -> Option<RsvpStatus> {
        if self.state.status == Some(tapped) {
            None
        } else {
            Some(tapped)
        }
    }

    pub fn apply_optimistic(&mut self, next: Option<RsvpStatus>) {
        self.last_error = None;
        self.state.status = next;
    }

    pub fn commit(&mut self, confirmed: Option<RsvpStatus>) {
        self.confirmed = confirmed;
        self.state.status = confirmed;
    }

    /// Return to the last server-confirmed value.
    pub fn rollback(&mut self, error: &AppError) {
        tracing::warn!("{}: RSVP rolled back: {}", self.name, error);
        self.state.status = self.confirmed;
        self.last_error = Some(error.to_string());
    }

    fn fold(&mut self, event: &SeriesRsvpSynced) {
        let next = reduce_local_state(&self.state, event);
        if next != self.state {
            tracing::debug!(
                "{}: occurrence {} synced to {:?}",
                self.name,
                next.occurrence_id,
                next.status
            );
            self.confirmed = next.status;
            self.state = next;
        }
    }

    /// Apply every queued broadcast without waiting. Returns how many were seen.
    pub fn drain_events(&mut self) -> usize {
        let mut seen = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.fold(&event);
                    seen += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("{}: missed {} sync event(s)", self.name, skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return seen,
            }
        }
    }

    /// Wait for the next broadcast and apply it. `None` once the bus is gone.
    pub async fn next_event(&mut self) -> Option<SeriesRsvpSynced> {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    self.fold(&event);
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("{}: missed {} sync event(s)", self.name, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Full tap cycle: toggle resolution, optimistic display, authoritative write,
/// then commit and broadcast, or roll back.
pub async fn tap_rsvp(
    widget: &mut RsvpWidget,
    writer: &dyn RsvpWriter,
    bus: &SyncBus,
    tapped: RsvpStatus,
    scope: SeriesScope,
) -> AppResult<RsvpOutcome> {
    let next = widget.resolve_tap(tapped);
    widget.apply_optimistic(next);

    let request = RsvpRequest {
        status: next,
        attending_count: None,
        scope: Some(scope),
    };
    let occurrence_id = widget.state().occurrence_id.clone();

    match writer.write_rsvp(&occurrence_id, &request).await {
        Ok(outcome) => {
            widget.commit(outcome.status);
            if outcome.scope == SeriesScope::Series {
                if let (Some(series_id), Some(effective_from)) =
                    (outcome.series_id.clone(), outcome.effective_from)
                {
                    bus.publish(SeriesRsvpSynced {
                        series_id,
                        effective_from,
                        new_status: outcome.status,
                        applied_to: outcome.applied_to.clone(),
                    });
                }
            }
            Ok(outcome)
        }
        Err(e) => {
            widget.rollback(&e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::engagement::TallyView;
    use std::sync::Mutex;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).expect("valid date")
    }

    fn occurrence(id: &str, series: Option<&str>, d: u32) -> OccurrenceState {
        OccurrenceState {
            occurrence_id: id.into(),
            series_id: series.map(str::to_string),
            occurrence_date: day(d),
            status: None,
        }
    }

    fn synced(series: &str, from: u32, status: Option<RsvpStatus>, applied: &[&str]) -> SeriesRsvpSynced {
        SeriesRsvpSynced {
            series_id: series.into(),
            effective_from: day(from),
            new_status: status,
            applied_to: applied.iter().map(|id| id.to_string()).collect(),
        }
    }

    /// Answers from a script and remembers what it was asked.
    struct ScriptedWriter {
        fail_with: Option<fn() -> AppError>,
        requests: Mutex<Vec<RsvpRequest>>,
    }

    #[async_trait]
    impl RsvpWriter for ScriptedWriter {
        async fn write_rsvp(&self, occurrence_id: &str, request: &RsvpRequest) -> AppResult<RsvpOutcome> {
            if let Ok(mut seen) = self.requests.lock() {
                seen.push(request.clone());
            }
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            let scope = request.scope.unwrap_or(SeriesScope::This);
            Ok(RsvpOutcome {
                occurrence_id: occurrence_id.to_string(),
                status: request.status,
                attending_count: request.status.map(|_| 1),
                scope,
                series_id: Some("s1".into()),
                effective_from: (scope == SeriesScope::Series).then(|| day(2)),
                applied_to: vec![occurrence_id.to_string()],
                tally: TallyView::default(),
            })
        }
    }

    fn writer(fail_with: Option<fn() -> AppError>) -> ScriptedWriter {
        ScriptedWriter {
            fail_with,
            requests: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn reducer_updates_current_and_later_occurrences_only() {
        let event = synced("s1", 2, Some(RsvpStatus::Yes), &["a", "b", "c", "d", "e"]);
        assert_eq!(reduce_local_state(&occurrence("a", Some("s1"), 1), &event).status, None);
        assert_eq!(
            reduce_local_state(&occurrence("b", Some("s1"), 2), &event).status,
            Some(RsvpStatus::Yes)
        );
        assert_eq!(
            reduce_local_state(&occurrence("c", Some("s1"), 3), &event).status,
            Some(RsvpStatus::Yes)
        );
        assert_eq!(reduce_local_state(&occurrence("d", Some("s2"), 3), &event).status, None);
        assert_eq!(reduce_local_state(&occurrence("e", None, 3), &event).status, None);
    }

    #[test]
    fn reducer_leaves_skipped_occurrences_alone() {
        let event = synced("s1", 2, Some(RsvpStatus::Yes), &["b", "d"]);
        let mut closed = occurrence("c", Some("s1"), 3);
        closed.status = Some(RsvpStatus::No);

        assert_eq!(reduce_local_state(&closed, &event), closed);
        assert_eq!(
            reduce_local_state(&occurrence("d", Some("s1"), 4), &event).status,
            Some(RsvpStatus::Yes)
        );
    }

    #[test]
    fn tapping_the_active_status_clears_it() {
        let bus = SyncBus::new(8);
        let mut state = occurrence("a", None, 1);
        state.status = Some(RsvpStatus::Yes);
        let widget = RsvpWidget::new("card", state, &bus);

        assert_eq!(widget.resolve_tap(RsvpStatus::Yes), None);
        assert_eq!(widget.resolve_tap(RsvpStatus::No), Some(RsvpStatus::No));
    }

    #[tokio::test]
    async fn failed_write_rolls_back_to_confirmed_value() {
        let bus = SyncBus::new(8);
        let mut state = occurrence("a", Some("s1"), 2);
        state.status = Some(RsvpStatus::Maybe);
        let mut widget = RsvpWidget::new("card", state, &bus);
        let failing = writer(Some(|| AppError::TransientWrite("offline".into())));

        let err = tap_rsvp(&mut widget, &failing, &bus, RsvpStatus::Yes, SeriesScope::This)
            .await
            .expect_err("write fails");

        assert!(err.is_transient());
        assert_eq!(widget.status(), Some(RsvpStatus::Maybe));
        assert!(widget.last_error().is_some());
    }

    #[tokio::test]
    async fn series_commit_reaches_sibling_widgets() {
        let bus = SyncBus::new(8);
        let mut feed_card = RsvpWidget::new("feed", occurrence("b", Some("s1"), 2), &bus);
        let mut upcoming = RsvpWidget::new("upcoming", occurrence("b", Some("s1"), 2), &bus);
        let mut past = RsvpWidget::new("past", occurrence("a", Some("s1"), 1), &bus);
        let ok = writer(None);

        tap_rsvp(&mut feed_card, &ok, &bus, RsvpStatus::Yes, SeriesScope::Series)
            .await
            .expect("write");

        assert_eq!(upcoming.drain_events(), 1);
        assert_eq!(past.drain_events(), 1);
        assert_eq!(feed_card.status(), Some(RsvpStatus::Yes));
        assert_eq!(upcoming.status(), Some(RsvpStatus::Yes));
        assert_eq!(past.status(), None);

        // Second tap on the same status is a clear, and clears the sibling too
        tap_rsvp(&mut feed_card, &ok, &bus, RsvpStatus::Yes, SeriesScope::Series)
            .await
            .expect("write");
        upcoming.drain_events();
        assert_eq!(feed_card.status(), None);
        assert_eq!(upcoming.status(), None);

        let sent = ok.requests.lock().expect("lock");
        assert_eq!(sent[0].status, Some(RsvpStatus::Yes));
        assert_eq!(sent[1].status, None);
    }

    #[tokio::test]
    async fn single_occurrence_commits_are_not_broadcast() {
        let bus = SyncBus::new(8);
        let mut card = RsvpWidget::new("feed", occurrence("b", Some("s1"), 2), &bus);
        let mut other = RsvpWidget::new("upcoming", occurrence("c", Some("s1"), 3), &bus);

        tap_rsvp(&mut card, &writer(None), &bus, RsvpStatus::Maybe, SeriesScope::This)
            .await
            .expect("write");

        assert_eq!(other.drain_events(), 0);
        assert_eq!(other.status(), None);
    }

    #[tokio::test]
    async fn widgets_can_wait_for_the_next_broadcast() {
        let bus = SyncBus::new(8);
        let mut widget = RsvpWidget::new("calendar", occurrence("c", Some("s1"), 3), &bus);

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(synced("s1", 2, Some(RsvpStatus::Maybe), &["c"]));
        });

        let event = widget.next_event().await.expect("event");
        assert_eq!(event.new_status, Some(RsvpStatus::Maybe));
        assert_eq!(widget.status(), Some(RsvpStatus::Maybe));

        drop(bus);
        assert_eq!(widget.next_event().await, None);
    }

    #[tokio::test]
    async fn lagging_widgets_keep_the_latest_state() {
        let bus = SyncBus::new(1);
        let mut widget = RsvpWidget::new("slow", occurrence("c", Some("s1"), 3), &bus);

        bus.publish(synced("s1", 1, Some(RsvpStatus::Yes), &["c"]));
        bus.publish(synced("s1", 1, Some(RsvpStatus::No), &["c"]));

        assert_eq!(widget.drain_events(), 1);
        assert_eq!(widget.status(), Some(RsvpStatus::No));
    }
}
