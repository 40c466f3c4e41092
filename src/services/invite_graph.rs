//! Loads and replaces the grant lists attached to records.

use std::collections::HashMap;

use sqlx::{SqliteConnection, SqlitePool};

use crate::db::models::{ScopeConfig, ShareableRecord};
use crate::db::repository::GrantRepository;
use crate::error::AppResult;
use crate::services::visibility::RecordGrants;

pub struct InviteGraph;

impl InviteGraph {
    pub async fn grants_for(pool: &SqlitePool, record_id: &str) -> AppResult<RecordGrants> {
        let ids = [record_id.to_string()];
        let mut grants = Self::grants_for_many(pool, &ids).await?;
        Ok(grants.remove(record_id).unwrap_or_default())
    }

    /// Batch load for a candidate set. Records without grants map to empty sets.
    pub async fn grants_for_many(
        pool: &SqlitePool,
        record_ids: &[String],
    ) -> AppResult<HashMap<String, RecordGrants>> {
        let (neighborhoods, invites) = futures::try_join!(
            GrantRepository::neighborhoods_for(pool, record_ids),
            GrantRepository::invites_for(pool, record_ids),
        )?;

        let mut by_record: HashMap<String, RecordGrants> = record_ids
            .iter()
            .map(|id| (id.clone(), RecordGrants::default()))
            .collect();

        for grant in neighborhoods {
            by_record
                .entry(grant.record_id.clone())
                .or_default()
                .add_neighborhood(grant);
        }
        for invite in &invites {
            by_record
                .entry(invite.record_id.clone())
                .or_default()
                .add_invite(invite);
        }

        Ok(by_record)
    }

    pub async fn replace(
        conn: &mut SqliteConnection,
        record_id: &str,
        scope: &ScopeConfig,
    ) -> AppResult<()> {
        GrantRepository::replace(conn, record_id, scope).await
    }

    /// Scope configuration currently in force on a record.
    pub fn scope_config(record: &ShareableRecord, grants: &RecordGrants) -> ScopeConfig {
        ScopeConfig {
            visibility_scope: record.visibility_scope,
            neighborhood_ids: grants.neighborhood_ids.iter().cloned().collect(),
            invitee_ids: grants.invitee_ids.iter().cloned().collect(),
            family_unit_ids: grants.family_unit_ids.iter().cloned().collect(),
        }
    }
}
