//! Shared fixtures for database-backed tests.
//!
//! The seeded community has two neighborhoods and two families:
//! alice (north, Silva), bob (south, Silva), carol (south, Jones) and a tenant admin.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::Config;
use crate::db::models::*;
use crate::db::repository::ResidentRepository;
use crate::services::records::{NewEvent, RecordService};
use crate::services::visibility::Viewer;
use crate::AppState;

pub const TENANT: &str = "tenant-lakeside";

pub struct Community {
    pub alice: Viewer,
    pub bob: Viewer,
    pub carol: Viewer,
    pub admin: Viewer,
    pub north: String,
    pub south: String,
    pub jones_family: String,
}

pub async fn test_state() -> Arc<AppState> {
    let options = SqliteConnectOptions::new()
        .filename(":memory:")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("in-memory database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let mut config = Config::default();
    config.jwt.secret = "test-secret".to_string();

    Arc::new(AppState { db: pool, config })
}

async fn exec(state: &AppState, sql: &str, binds: &[&str]) {
    let mut query = sqlx::query(sql);
    for value in binds {
        query = query.bind(*value);
    }
    query.execute(&state.db).await.expect("seed statement");
}

async fn viewer(state: &AppState, id: &str) -> Viewer {
    ResidentRepository::find_membership(&state.db, TENANT, id)
        .await
        .expect("membership query")
        .map(Viewer::from)
        .expect("seeded resident")
}

pub async fn seed_community(state: &Arc<AppState>) -> Community {
    for (id, name) in [("nb-north", "North Village"), ("nb-south", "South Meadows")] {
        exec(
            state,
            "INSERT INTO neighborhoods (id, tenant_id, name) VALUES (?, ?, ?)",
            &[id, TENANT, name],
        )
        .await;
    }
    for (id, neighborhood, number) in [
        ("lot-n1", "nb-north", "N-1"),
        ("lot-s1", "nb-south", "S-1"),
        ("lot-s2", "nb-south", "S-2"),
    ] {
        exec(
            state,
            "INSERT INTO lots (id, tenant_id, neighborhood_id, lot_number) VALUES (?, ?, ?, ?)",
            &[id, TENANT, neighborhood, number],
        )
        .await;
    }
    for (id, name, contact) in [
        ("fam-silva", "Silva", "res-alice"),
        ("fam-jones", "Jones", "res-carol"),
    ] {
        exec(
            state,
            "INSERT INTO family_units (id, tenant_id, name, primary_contact_id) VALUES (?, ?, ?, ?)",
            &[id, TENANT, name, contact],
        )
        .await;
    }

    exec(
        state,
        r#"
        INSERT INTO residents (
            id, tenant_id, first_name, last_name, email, phone, languages,
            interests, about, lot_id, family_unit_id, role
        )
        VALUES (?, ?, 'Alice', 'Silva', 'alice@example.com', '555-0101',
                '["en","pt"]', '["gardening"]', 'Loves the lake', 'lot-n1', 'fam-silva', 'resident')
        "#,
        &["res-alice", TENANT],
    )
    .await;
    for (id, first, last, lot, family) in [
        ("res-bob", "Bob", "Silva", "lot-s1", "fam-silva"),
        ("res-carol", "Carol", "Jones", "lot-s2", "fam-jones"),
    ] {
        exec(
            state,
            r#"
            INSERT INTO residents (id, tenant_id, first_name, last_name, phone, lot_id, family_unit_id, role)
            VALUES (?, ?, ?, ?, '555-0100', ?, ?, 'resident')
            "#,
            &[id, TENANT, first, last, lot, family],
        )
        .await;
    }
    exec(
        state,
        r#"
        INSERT INTO residents (id, tenant_id, first_name, last_name, role)
        VALUES (?, ?, 'Dana', 'Admin', 'tenant_admin')
        "#,
        &["res-admin", TENANT],
    )
    .await;

    Community {
        alice: viewer(state, "res-alice").await,
        bob: viewer(state, "res-bob").await,
        carol: viewer(state, "res-carol").await,
        admin: viewer(state, "res-admin").await,
        north: "nb-north".to_string(),
        south: "nb-south".to_string(),
        jones_family: "fam-jones".to_string(),
    }
}

pub fn community_scope() -> ScopeConfig {
    ScopeConfig::community()
}

pub fn private_scope<S: AsRef<str>>(invitees: &[S]) -> ScopeConfig {
    ScopeConfig {
        visibility_scope: VisibilityScope::Private,
        invitee_ids: invitees.iter().map(|s| s.as_ref().to_string()).collect(),
        ..ScopeConfig::community()
    }
}

pub fn neighborhood_scope<S: AsRef<str>>(neighborhoods: &[S]) -> ScopeConfig {
    ScopeConfig {
        visibility_scope: VisibilityScope::Neighborhood,
        neighborhood_ids: neighborhoods.iter().map(|s| s.as_ref().to_string()).collect(),
        ..ScopeConfig::community()
    }
}

fn upcoming_date(days: i64) -> NaiveDate {
    (Utc::now() + Duration::days(days)).date_naive()
}

fn new_event(title: &str, scope: ScopeConfig) -> NewEvent {
    NewEvent {
        title: title.to_string(),
        description: None,
        location_name: Some("Clubhouse".to_string()),
        start_date: upcoming_date(7),
        end_date: None,
        max_attendees: None,
        rsvp_deadline: None,
        recurrence_rule: None,
        draft: false,
        scope,
    }
}

pub async fn seed_event(
    state: &Arc<AppState>,
    viewer: &Viewer,
    title: &str,
    scope: ScopeConfig,
) -> ShareableRecord {
    seed_event_with(state, viewer, title, scope, |_| {}).await
}

pub async fn seed_event_with(
    state: &Arc<AppState>,
    viewer: &Viewer,
    title: &str,
    scope: ScopeConfig,
    adjust: impl FnOnce(&mut NewEvent),
) -> ShareableRecord {
    let mut draft = new_event(title, scope);
    adjust(&mut draft);
    RecordService::create_event(state, viewer, draft)
        .await
        .expect("create event")
        .into_iter()
        .next()
        .expect("at least one occurrence")
}

/// Daily series starting next week, returned in date order.
pub async fn seed_series(
    state: &Arc<AppState>,
    viewer: &Viewer,
    title: &str,
    count: u32,
) -> Vec<ShareableRecord> {
    let mut draft = new_event(title, ScopeConfig::community());
    draft.recurrence_rule = Some(format!("FREQ=DAILY;INTERVAL=1;COUNT={}", count));
    RecordService::create_event(state, viewer, draft)
        .await
        .expect("create series")
}

/// In-memory record for pure tests.
pub fn sample_record(id: &str, kind: RecordKind, scope: VisibilityScope) -> ShareableRecord {
    let now = Utc::now().naive_utc();
    let is_check_in = kind == RecordKind::CheckIn;
    ShareableRecord {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        kind,
        created_by: "res-creator".to_string(),
        title: "Sample".to_string(),
        description: None,
        location_name: None,
        visibility_scope: scope,
        status: if is_check_in {
            RecordStatus::Active
        } else {
            RecordStatus::Published
        },
        start_time: is_check_in.then_some(now),
        duration_minutes: is_check_in.then_some(60),
        start_date: (!is_check_in).then(|| upcoming_date(7)),
        end_date: (!is_check_in).then(|| upcoming_date(7)),
        parent_record_id: None,
        recurrence_rule: None,
        max_attendees: None,
        rsvp_deadline: None,
        ended_at: None,
        cancelled_at: None,
        cancellation_reason: None,
        published_at: (!is_check_in).then_some(now),
        created_at: now,
        updated_at: now,
    }
}

pub fn bearer(state: &Arc<AppState>, viewer: &Viewer) -> String {
    let token = crate::services::auth::AuthService::create_jwt(state, &viewer.user_id, &viewer.tenant_id)
        .expect("jwt");
    format!("Bearer {}", token)
}

/// Send one request through a router and decode the JSON body (`Null` when empty).
pub async fn call(
    app: axum::Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<serde_json::Value>,
) -> (axum::http::StatusCode, serde_json::Value) {
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string())),
        None => builder.body(axum::body::Body::empty()),
    }
    .expect("request");

    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, json)
}
