use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Resident Repository
// ============================================================================

const PROFILE_SELECT: &str = r#"
    SELECT
        r.id, r.tenant_id, r.first_name, r.last_name,
        r.email, r.phone, r.birthday, r.birth_country, r.current_country,
        r.languages, r.preferred_language, r.journey_stage, r.estimated_move_in_date,
        r.profile_picture_url, r.interests, r.skills, r.open_to_requests, r.about,
        r.family_relationships,
        r.family_unit_id, f.name AS family_name,
        l.neighborhood_id, n.name AS neighborhood_name
    FROM residents r
    LEFT JOIN family_units f ON f.id = r.family_unit_id
    LEFT JOIN lots l ON l.id = r.lot_id
    LEFT JOIN neighborhoods n ON n.id = l.neighborhood_id
"#;

pub struct ResidentRepository;

impl ResidentRepository {
    /// Resident plus the neighborhood of their assigned lot.
    pub async fn find_membership<'e, E: SqliteExecutor<'e>>(
        executor: E,
        tenant_id: &str,
        id: &str,
    ) -> AppResult<Option<ResidentMembership>> {
        sqlx::query_as::<_, ResidentMembership>(
            r#"
            SELECT r.id, r.tenant_id, r.family_unit_id, l.neighborhood_id, r.role
            FROM residents r
            LEFT JOIN lots l ON l.id = r.lot_id
            WHERE r.id = ? AND r.tenant_id = ?
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_profile<'e, E: SqliteExecutor<'e>>(
        executor: E,
        tenant_id: &str,
        id: &str,
    ) -> AppResult<Option<RawProfile>> {
        let sql = format!("{PROFILE_SELECT} WHERE r.id = ? AND r.tenant_id = ?");
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(executor)
            .await
            .map_err(AppError::Database)?;

        Ok(row.map(RawProfile::from))
    }

    pub async fn find_profiles<'e, E: SqliteExecutor<'e>>(
        executor: E,
        tenant_id: &str,
        ids: &[String],
    ) -> AppResult<Vec<RawProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(PROFILE_SELECT);
        qb.push(" WHERE r.tenant_id = ");
        qb.push_bind(tenant_id.to_string());
        qb.push(" AND r.id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let rows = qb
            .build_query_as::<ProfileRow>()
            .fetch_all(executor)
            .await
            .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(RawProfile::from).collect())
    }
}
