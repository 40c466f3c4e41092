use std::collections::HashMap;

use chrono::NaiveDateTime;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqliteExecutor};

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Engagement Repository
// ============================================================================

const UPSERT_CONFLICT: &str = r#"
    ON CONFLICT(occurrence_id, user_id) DO UPDATE SET
        status = excluded.status,
        attending_count = excluded.attending_count,
        updated_at = excluded.updated_at
"#;

pub struct EngagementRepository;

impl EngagementRepository {
    /// Single-statement upsert keyed on `(occurrence_id, user_id)`; concurrent
    /// writers serialize in SQLite and the last one wins.
    pub async fn upsert<'e, E: SqliteExecutor<'e>>(
        executor: E,
        response: &ResponseUpsert,
        now: NaiveDateTime,
    ) -> AppResult<EngagementRecord> {
        let sql = format!(
            r#"
            INSERT INTO engagement_records (
                occurrence_id, user_id, tenant_id, status, attending_count, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            {UPSERT_CONFLICT}
            RETURNING *
            "#
        );

        sqlx::query_as::<_, EngagementRecord>(&sql)
            .bind(&response.occurrence_id)
            .bind(&response.user_id)
            .bind(&response.tenant_id)
            .bind(response.status)
            .bind(response.attending_count)
            .bind(now)
            .bind(now)
            .fetch_one(executor)
            .await
            .map_err(AppError::transient)
    }

    /// One multi-row upsert statement for a batch of occurrences.
    pub async fn upsert_batch(
        conn: &mut SqliteConnection,
        responses: &[ResponseUpsert],
        now: NaiveDateTime,
    ) -> AppResult<u64> {
        if responses.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO engagement_records (occurrence_id, user_id, tenant_id, status, attending_count, created_at, updated_at) ",
        );
        qb.push_values(responses, |mut row, response| {
            row.push_bind(response.occurrence_id.clone())
                .push_bind(response.user_id.clone())
                .push_bind(response.tenant_id.clone())
                .push_bind(response.status)
                .push_bind(response.attending_count)
                .push_bind(now)
                .push_bind(now);
        });
        qb.push(UPSERT_CONFLICT);

        let result = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(AppError::transient)?;

        Ok(result.rows_affected())
    }

    pub async fn delete<'e, E: SqliteExecutor<'e>>(
        executor: E,
        occurrence_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM engagement_records WHERE occurrence_id = ? AND user_id = ?")
                .bind(occurrence_id)
                .bind(user_id)
                .execute(executor)
                .await
                .map_err(AppError::transient)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_batch(
        conn: &mut SqliteConnection,
        occurrence_ids: &[String],
        user_id: &str,
    ) -> AppResult<u64> {
        if occurrence_ids.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM engagement_records WHERE user_id = ");
        qb.push_bind(user_id.to_string());
        qb.push(" AND occurrence_id IN (");
        let mut separated = qb.separated(", ");
        for id in occurrence_ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let result = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(AppError::transient)?;

        Ok(result.rows_affected())
    }

    pub async fn find<'e, E: SqliteExecutor<'e>>(
        executor: E,
        occurrence_id: &str,
        user_id: &str,
    ) -> AppResult<Option<EngagementRecord>> {
        sqlx::query_as::<_, EngagementRecord>(
            "SELECT * FROM engagement_records WHERE occurrence_id = ? AND user_id = ?",
        )
        .bind(occurrence_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::Database)
    }

    /// The user's own responses across a set of occurrences.
    pub async fn find_for_user<'e, E: SqliteExecutor<'e>>(
        executor: E,
        user_id: &str,
        occurrence_ids: &[String],
    ) -> AppResult<Vec<EngagementRecord>> {
        if occurrence_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT * FROM engagement_records WHERE user_id = ");
        qb.push_bind(user_id.to_string());
        qb.push(" AND occurrence_id IN (");
        let mut separated = qb.separated(", ");
        for id in occurrence_ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        qb.build_query_as::<EngagementRecord>()
            .fetch_all(executor)
            .await
            .map_err(AppError::Database)
    }

    pub async fn list_responses<'e, E: SqliteExecutor<'e>>(
        executor: E,
        occurrence_id: &str,
    ) -> AppResult<Vec<EngagementRecord>> {
        sqlx::query_as::<_, EngagementRecord>(
            r#"
            SELECT * FROM engagement_records
            WHERE occurrence_id = ?
            ORDER BY status ASC, updated_at ASC
            "#,
        )
        .bind(occurrence_id)
        .fetch_all(executor)
        .await
        .map_err(AppError::Database)
    }

    // ========================================================================
    // Aggregates (computed at read time)
    // ========================================================================

    pub async fn tallies<'e, E: SqliteExecutor<'e>>(
        executor: E,
        occurrence_ids: &[String],
    ) -> AppResult<HashMap<String, RsvpTally>> {
        let mut tallies: HashMap<String, RsvpTally> = HashMap::new();
        if occurrence_ids.is_empty() {
            return Ok(tallies);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT occurrence_id, status, COALESCE(SUM(attending_count), 0) AS total
            FROM engagement_records
            WHERE occurrence_id IN (
            "#,
        );
        let mut separated = qb.separated(", ");
        for id in occurrence_ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");
        qb.push(" GROUP BY occurrence_id, status");

        let rows = qb
            .build()
            .fetch_all(executor)
            .await
            .map_err(AppError::Database)?;

        for row in rows {
            let occurrence_id: String = row.get("occurrence_id");
            let status: RsvpStatus = row.get("status");
            let total: i64 = row.get("total");
            tallies.entry(occurrence_id).or_default().add(status, total);
        }

        Ok(tallies)
    }

    pub async fn tally<'e, E: SqliteExecutor<'e>>(
        executor: E,
        occurrence_id: &str,
    ) -> AppResult<RsvpTally> {
        let ids = [occurrence_id.to_string()];
        let tallies = Self::tallies(executor, &ids).await?;
        Ok(tallies.get(occurrence_id).copied().unwrap_or_default())
    }

    /// Sum of `yes` head counts on an occurrence, ignoring one user's own row.
    pub async fn yes_total_excluding<'e, E: SqliteExecutor<'e>>(
        executor: E,
        occurrence_id: &str,
        user_id: &str,
    ) -> AppResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(attending_count), 0) AS total
            FROM engagement_records
            WHERE occurrence_id = ? AND status = 'yes' AND user_id <> ?
            "#,
        )
        .bind(occurrence_id)
        .bind(user_id)
        .fetch_one(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(row.get("total"))
    }
}
