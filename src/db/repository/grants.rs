use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqliteExecutor};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Grant Repository (record_neighborhoods, record_invites)
// ============================================================================

pub struct GrantRepository;

impl GrantRepository {
    pub async fn neighborhoods_for<'e, E: SqliteExecutor<'e>>(
        executor: E,
        record_ids: &[String],
    ) -> AppResult<Vec<NeighborhoodGrant>> {
        if record_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT record_id, neighborhood_id FROM record_neighborhoods WHERE record_id IN (",
        );
        let mut ids = qb.separated(", ");
        for id in record_ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");

        qb.build_query_as::<NeighborhoodGrant>()
            .fetch_all(executor)
            .await
            .map_err(AppError::Database)
    }

    pub async fn invites_for<'e, E: SqliteExecutor<'e>>(
        executor: E,
        record_ids: &[String],
    ) -> AppResult<Vec<Invite>> {
        if record_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, record_id, invitee_id, family_unit_id FROM record_invites WHERE record_id IN (",
        );
        let mut ids = qb.separated(", ");
        for id in record_ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");

        qb.build_query_as::<Invite>()
            .fetch_all(executor)
            .await
            .map_err(AppError::Database)
    }

    /// Delete-then-insert of every grant on a record. Run inside the caller's
    /// transaction so readers never observe a half-replaced grant set.
    pub async fn replace(
        conn: &mut SqliteConnection,
        record_id: &str,
        scope: &ScopeConfig,
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM record_neighborhoods WHERE record_id = ?")
            .bind(record_id)
            .execute(&mut *conn)
            .await
            .map_err(AppError::transient)?;

        sqlx::query("DELETE FROM record_invites WHERE record_id = ?")
            .bind(record_id)
            .execute(&mut *conn)
            .await
            .map_err(AppError::transient)?;

        if !scope.neighborhood_ids.is_empty() {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "INSERT INTO record_neighborhoods (record_id, neighborhood_id) ",
            );
            qb.push_values(&scope.neighborhood_ids, |mut row, neighborhood_id| {
                row.push_bind(record_id.to_string())
                    .push_bind(neighborhood_id.clone());
            });
            qb.build()
                .execute(&mut *conn)
                .await
                .map_err(AppError::transient)?;
        }

        let invites: Vec<(Option<String>, Option<String>)> = scope
            .invitee_ids
            .iter()
            .map(|id| (Some(id.clone()), None))
            .chain(
                scope
                    .family_unit_ids
                    .iter()
                    .map(|id| (None, Some(id.clone()))),
            )
            .collect();

        if !invites.is_empty() {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "INSERT INTO record_invites (id, record_id, invitee_id, family_unit_id) ",
            );
            qb.push_values(invites, |mut row, (invitee_id, family_unit_id)| {
                row.push_bind(Uuid::new_v4().to_string())
                    .push_bind(record_id.to_string())
                    .push_bind(invitee_id)
                    .push_bind(family_unit_id);
            });
            qb.build()
                .execute(&mut *conn)
                .await
                .map_err(AppError::transient)?;
        }

        Ok(())
    }
}
