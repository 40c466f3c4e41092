pub mod auth;
pub mod engagement;
pub mod health;
pub mod profiles;
pub mod records;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

/// Every API route, with the engagement router supplied by the caller so the
/// binary can wrap it in a rate limiter.
pub fn api(engagement: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/auth", auth::router())
        .nest("/api/records", records::router())
        .nest("/api/engagement", engagement)
        .nest("/api/profiles", profiles::router())
}

/// The application without rate limiting, used by tests and embedders.
pub fn app(state: Arc<AppState>) -> Router {
    api(engagement::router())
        .with_state(state)
        .layer(axum::middleware::from_fn(crate::middleware::csp::csp_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{RsvpStatus, ShareableRecord};
    use crate::error::AppError;
    use crate::services::auth::AuthService;
    use crate::services::rsvp_client::HttpRsvpWriter;
    use crate::db::repository::EngagementRepository;
    use crate::services::series::{CancelRequest, SeriesCoordinator, SeriesScope};
    use crate::services::sync_bus::{tap_rsvp, OccurrenceState, RsvpWidget, SyncBus};
    use crate::test_support::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn health_and_security_headers() {
        let state = test_state().await;
        let response = {
            use tower::ServiceExt;
            app(state)
                .oneshot(
                    axum::http::Request::get("/health")
                        .body(axum::body::Body::empty())
                        .expect("request"),
                )
                .await
                .expect("response")
        };

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers.get("content-security-policy").and_then(|v| v.to_str().ok()),
            Some("default-src 'none'; frame-ancestors 'none'")
        );
        assert_eq!(
            headers.get("x-content-type-options").and_then(|v| v.to_str().ok()),
            Some("nosniff")
        );
    }

    #[tokio::test]
    async fn series_rsvp_syncs_sibling_widgets_over_http() {
        let state = test_state().await;
        let c = seed_community(&state).await;
        let series = seed_series(&state, &c.alice, "Sunrise yoga", 3).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let router = app(state.clone());
        let server = tokio::spawn(async move { axum::serve(listener, router).await });

        let token = AuthService::create_jwt(&state, &c.bob.user_id, TENANT).expect("jwt");
        let writer =
            HttpRsvpWriter::new(&format!("http://{}", addr), token).expect("writer");

        let occurrence = |record: &ShareableRecord| OccurrenceState {
            occurrence_id: record.id.clone(),
            series_id: Some(record.series_id().to_string()),
            occurrence_date: record.occurrence_date().expect("dated occurrence"),
            status: None,
        };

        let bus = SyncBus::new(state.config.engagement.sync_channel_capacity);
        let mut feed_card = RsvpWidget::new("feed", occurrence(&series[1]), &bus);
        let mut upcoming = RsvpWidget::new("upcoming", occurrence(&series[2]), &bus);
        let mut first_day = RsvpWidget::new("first-day", occurrence(&series[0]), &bus);

        let outcome = tap_rsvp(
            &mut feed_card,
            &writer,
            &bus,
            RsvpStatus::Yes,
            SeriesScope::Series,
        )
        .await
        .expect("series rsvp");
        assert_eq!(outcome.applied_to, vec![series[1].id.clone(), series[2].id.clone()]);

        upcoming.drain_events();
        first_day.drain_events();
        assert_eq!(feed_card.status(), Some(RsvpStatus::Yes));
        assert_eq!(upcoming.status(), Some(RsvpStatus::Yes));
        assert_eq!(first_day.status(), None);

        // Tapping the active status again clears it from that date on
        tap_rsvp(
            &mut upcoming,
            &writer,
            &bus,
            RsvpStatus::Yes,
            SeriesScope::Series,
        )
        .await
        .expect("series clear");
        feed_card.drain_events();
        assert_eq!(upcoming.status(), None);
        assert_eq!(feed_card.status(), Some(RsvpStatus::Yes));

        // Rejected writes roll the widget back
        let err = tap_rsvp(
            &mut first_day,
            &HttpRsvpWriter::new(&format!("http://{}", addr), "not-a-token").expect("writer"),
            &bus,
            RsvpStatus::Maybe,
            SeriesScope::This,
        )
        .await
        .expect_err("bad token");
        assert!(matches!(err, AppError::Unauthorized));
        assert_eq!(first_day.status(), None);

        server.abort();
    }

    #[tokio::test]
    async fn skipped_occurrences_keep_their_widget_state() {
        let state = test_state().await;
        let c = seed_community(&state).await;
        let series = seed_series(&state, &c.alice, "Pickleball", 3).await;

        SeriesCoordinator::cancel(
            &state,
            &c.alice,
            &series[2].id,
            CancelRequest {
                reason: Some("Court resurfacing".into()),
                uncancel: false,
            },
            Some(SeriesScope::This),
        )
        .await
        .expect("cancel day three");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let router = app(state.clone());
        let server = tokio::spawn(async move { axum::serve(listener, router).await });

        let token = AuthService::create_jwt(&state, &c.bob.user_id, TENANT).expect("jwt");
        let writer =
            HttpRsvpWriter::new(&format!("http://{}", addr), token).expect("writer");

        let occurrence = |record: &ShareableRecord| OccurrenceState {
            occurrence_id: record.id.clone(),
            series_id: Some(record.series_id().to_string()),
            occurrence_date: record.occurrence_date().expect("dated occurrence"),
            status: None,
        };

        let bus = SyncBus::new(state.config.engagement.sync_channel_capacity);
        let mut first_day = RsvpWidget::new("first-day", occurrence(&series[0]), &bus);
        let mut second_day = RsvpWidget::new("second-day", occurrence(&series[1]), &bus);
        let mut cancelled_day = RsvpWidget::new("cancelled-day", occurrence(&series[2]), &bus);

        let outcome = tap_rsvp(
            &mut first_day,
            &writer,
            &bus,
            RsvpStatus::Yes,
            SeriesScope::Series,
        )
        .await
        .expect("series rsvp");
        assert_eq!(outcome.applied_to, vec![series[0].id.clone(), series[1].id.clone()]);

        second_day.drain_events();
        cancelled_day.drain_events();
        assert_eq!(second_day.status(), Some(RsvpStatus::Yes));
        assert_eq!(cancelled_day.status(), None);

        let stored = EngagementRepository::find(&state.db, &series[2].id, &c.bob.user_id)
            .await
            .expect("lookup");
        assert!(stored.is_none());

        server.abort();
    }
}
