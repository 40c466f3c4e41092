use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Shareable Record Repository
// ============================================================================

pub struct RecordRepository;

impl RecordRepository {
    pub async fn insert<'e, E: SqliteExecutor<'e>>(
        executor: E,
        new: &NewRecord,
        now: NaiveDateTime,
    ) -> AppResult<ShareableRecord> {
        let id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, ShareableRecord>(
            r#"
            INSERT INTO shareable_records (
                id, tenant_id, kind, created_by, title, description, location_name,
                visibility_scope, status, start_time, duration_minutes,
                start_date, end_date, parent_record_id, recurrence_rule,
                max_attendees, rsvp_deadline, published_at,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&new.tenant_id)
        .bind(new.kind)
        .bind(&new.created_by)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.location_name)
        .bind(new.visibility_scope)
        .bind(new.status)
        .bind(new.start_time)
        .bind(new.duration_minutes)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(&new.parent_record_id)
        .bind(&new.recurrence_rule)
        .bind(new.max_attendees)
        .bind(new.rsvp_deadline)
        .bind(new.published_at)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(AppError::transient)
    }

    pub async fn find_by_id<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: &str,
    ) -> AppResult<Option<ShareableRecord>> {
        sqlx::query_as::<_, ShareableRecord>("SELECT * FROM shareable_records WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(AppError::Database)
    }

    /// Tenant-scoped lookup. Records of other tenants read as missing.
    pub async fn find_in_tenant<'e, E: SqliteExecutor<'e>>(
        executor: E,
        tenant_id: &str,
        id: &str,
    ) -> AppResult<Option<ShareableRecord>> {
        sqlx::query_as::<_, ShareableRecord>(
            "SELECT * FROM shareable_records WHERE id = ? AND tenant_id = ?",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::Database)
    }

    /// Candidate set for feeds, newest first.
    pub async fn list_by_tenant<'e, E: SqliteExecutor<'e>>(
        executor: E,
        tenant_id: &str,
        kind: Option<RecordKind>,
    ) -> AppResult<Vec<ShareableRecord>> {
        match kind {
            Some(kind) => sqlx::query_as::<_, ShareableRecord>(
                r#"
                SELECT * FROM shareable_records
                WHERE tenant_id = ? AND kind = ?
                ORDER BY COALESCE(start_time, start_date, created_at) DESC
                "#,
            )
            .bind(tenant_id)
            .bind(kind)
            .fetch_all(executor)
            .await
            .map_err(AppError::Database),
            None => sqlx::query_as::<_, ShareableRecord>(
                r#"
                SELECT * FROM shareable_records
                WHERE tenant_id = ?
                ORDER BY COALESCE(start_time, start_date, created_at) DESC
                "#,
            )
            .bind(tenant_id)
            .fetch_all(executor)
            .await
            .map_err(AppError::Database),
        }
    }

    /// Members of a series falling on or after `from`, in date order.
    pub async fn list_series_from<'e, E: SqliteExecutor<'e>>(
        executor: E,
        tenant_id: &str,
        series_id: &str,
        from: NaiveDate,
    ) -> AppResult<Vec<ShareableRecord>> {
        sqlx::query_as::<_, ShareableRecord>(
            r#"
            SELECT * FROM shareable_records
            WHERE tenant_id = ?
              AND (id = ? OR parent_record_id = ?)
              AND COALESCE(start_date, date(start_time)) >= ?
            ORDER BY COALESCE(start_date, date(start_time)) ASC
            "#,
        )
        .bind(tenant_id)
        .bind(series_id)
        .bind(series_id)
        .bind(from)
        .fetch_all(executor)
        .await
        .map_err(AppError::Database)
    }

    // ========================================================================
    // Updates
    // ========================================================================

    pub async fn set_scope<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: &str,
        scope: VisibilityScope,
        now: NaiveDateTime,
    ) -> AppResult<()> {
        sqlx::query("UPDATE shareable_records SET visibility_scope = ?, updated_at = ? WHERE id = ?")
            .bind(scope)
            .bind(now)
            .bind(id)
            .execute(executor)
            .await
            .map_err(AppError::transient)?;
        Ok(())
    }

    pub async fn set_duration<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: &str,
        duration_minutes: i64,
        now: NaiveDateTime,
    ) -> AppResult<ShareableRecord> {
        sqlx::query_as::<_, ShareableRecord>(
            r#"
            UPDATE shareable_records
            SET duration_minutes = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(duration_minutes)
        .bind(now)
        .bind(id)
        .fetch_one(executor)
        .await
        .map_err(AppError::transient)
    }

    /// Status transition. `ended_at`, `cancelled_at` and `published_at` are stamped
    /// when entering the matching status and cleared on reactivation.
    pub async fn set_status<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: &str,
        status: RecordStatus,
        cancellation_reason: Option<&str>,
        now: NaiveDateTime,
    ) -> AppResult<ShareableRecord> {
        sqlx::query_as::<_, ShareableRecord>(
            r#"
            UPDATE shareable_records
            SET status = ?1,
                ended_at = CASE WHEN ?1 = 'ended' THEN ?3 ELSE ended_at END,
                cancelled_at = CASE
                    WHEN ?1 = 'cancelled' THEN ?3
                    WHEN ?1 IN ('active', 'published') THEN NULL
                    ELSE cancelled_at END,
                cancellation_reason = CASE
                    WHEN ?1 = 'cancelled' THEN ?2
                    WHEN ?1 IN ('active', 'published') THEN NULL
                    ELSE cancellation_reason END,
                published_at = CASE
                    WHEN ?1 = 'published' THEN COALESCE(published_at, ?3)
                    ELSE published_at END,
                updated_at = ?3
            WHERE id = ?4
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(cancellation_reason)
        .bind(now)
        .bind(id)
        .fetch_one(executor)
        .await
        .map_err(AppError::transient)
    }

    /// Apply the provided fields of an edit; absent fields are left alone.
    pub async fn apply_edit<'e, E: SqliteExecutor<'e>>(
        executor: E,
        id: &str,
        edit: &RecordEdit,
        now: NaiveDateTime,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE shareable_records
            SET title = COALESCE(?, title),
                description = COALESCE(?, description),
                location_name = COALESCE(?, location_name),
                max_attendees = COALESCE(?, max_attendees),
                rsvp_deadline = COALESCE(?, rsvp_deadline),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&edit.title)
        .bind(&edit.description)
        .bind(&edit.location_name)
        .bind(edit.max_attendees)
        .bind(edit.rsvp_deadline)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await
        .map_err(AppError::transient)?;
        Ok(())
    }

    /// Grants and engagement rows go with the record through `ON DELETE CASCADE`.
    pub async fn delete<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM shareable_records WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await
            .map_err(AppError::transient)?;

        Ok(result.rows_affected() > 0)
    }
}
