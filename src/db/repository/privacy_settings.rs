use chrono::NaiveDateTime;
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Privacy Settings Repository
// ============================================================================

pub struct PrivacySettingsRepository;

impl PrivacySettingsRepository {
    pub async fn find_by_user_id<'e, E: SqliteExecutor<'e>>(
        executor: E,
        user_id: &str,
    ) -> AppResult<Option<PrivacySettings>> {
        sqlx::query_as::<_, PrivacySettings>("SELECT * FROM privacy_settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(executor)
            .await
            .map_err(AppError::Database)
    }

    pub async fn find_many<'e, E: SqliteExecutor<'e>>(
        executor: E,
        user_ids: &[String],
    ) -> AppResult<Vec<PrivacySettings>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM privacy_settings WHERE user_id IN (");
        let mut separated = qb.separated(", ");
        for id in user_ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        qb.build_query_as::<PrivacySettings>()
            .fetch_all(executor)
            .await
            .map_err(AppError::Database)
    }

    /// Insert or overwrite the whole row for `settings.user_id`.
    pub async fn upsert<'e, E: SqliteExecutor<'e>>(
        executor: E,
        settings: &PrivacySettings,
        now: NaiveDateTime,
    ) -> AppResult<PrivacySettings> {
        sqlx::query_as::<_, PrivacySettings>(
            r#"
            INSERT INTO privacy_settings (
                user_id,
                show_email, show_phone, show_birthday, show_birth_country,
                show_current_country, show_languages, show_preferred_language,
                show_journey_stage, show_estimated_move_in_date, show_profile_picture,
                show_neighborhood, show_family, show_family_relationships,
                show_interests, show_skills, show_open_to_requests, show_about,
                updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                show_email = excluded.show_email,
                show_phone = excluded.show_phone,
                show_birthday = excluded.show_birthday,
                show_birth_country = excluded.show_birth_country,
                show_current_country = excluded.show_current_country,
                show_languages = excluded.show_languages,
                show_preferred_language = excluded.show_preferred_language,
                show_journey_stage = excluded.show_journey_stage,
                show_estimated_move_in_date = excluded.show_estimated_move_in_date,
                show_profile_picture = excluded.show_profile_picture,
                show_neighborhood = excluded.show_neighborhood,
                show_family = excluded.show_family,
                show_family_relationships = excluded.show_family_relationships,
                show_interests = excluded.show_interests,
                show_skills = excluded.show_skills,
                show_open_to_requests = excluded.show_open_to_requests,
                show_about = excluded.show_about,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&settings.user_id)
        .bind(settings.show_email)
        .bind(settings.show_phone)
        .bind(settings.show_birthday)
        .bind(settings.show_birth_country)
        .bind(settings.show_current_country)
        .bind(settings.show_languages)
        .bind(settings.show_preferred_language)
        .bind(settings.show_journey_stage)
        .bind(settings.show_estimated_move_in_date)
        .bind(settings.show_profile_picture)
        .bind(settings.show_neighborhood)
        .bind(settings.show_family)
        .bind(settings.show_family_relationships)
        .bind(settings.show_interests)
        .bind(settings.show_skills)
        .bind(settings.show_open_to_requests)
        .bind(settings.show_about)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(AppError::transient)
    }
}
