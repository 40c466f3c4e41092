use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::repository::ResidentRepository;
use crate::error::{AppError, AppResult};
use crate::services::visibility::Viewer;
use crate::AppState;

/// Identity asserted by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub tenant_id: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct AuthService;

impl AuthService {
    /// Create a signed JWT for a resident. Tokens are normally issued by the
    /// identity provider; this is used by tooling and tests.
    pub fn create_jwt(state: &Arc<AppState>, user_id: &str, tenant_id: &str) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(state.config.jwt.expiration_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn decode_jwt(state: &Arc<AppState>, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Resolve verified claims into a viewer. Unknown residents are unauthenticated.
    pub async fn load_viewer(state: &Arc<AppState>, claims: &Claims) -> AppResult<Viewer> {
        let membership =
            ResidentRepository::find_membership(&state.db, &claims.tenant_id, &claims.sub)
                .await?
                .ok_or_else(|| {
                    tracing::debug!(
                        "Token subject {} is not a resident of {}",
                        claims.sub,
                        claims.tenant_id
                    );
                    AppError::Unauthorized
                })?;

        Ok(Viewer::from(membership))
    }

    pub async fn viewer_from_token(state: &Arc<AppState>, token: &str) -> AppResult<Viewer> {
        let claims = Self::decode_jwt(state, token)?;
        Self::load_viewer(state, &claims).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn token_round_trip_builds_the_viewer() {
        let state = test_state().await;
        let c = seed_community(&state).await;

        let token = AuthService::create_jwt(&state, &c.bob.user_id, &c.bob.tenant_id).expect("jwt");
        let viewer = AuthService::viewer_from_token(&state, &token)
            .await
            .expect("viewer");

        assert_eq!(viewer, c.bob);
        assert_eq!(viewer.neighborhood_id.as_deref(), Some(c.south.as_str()));
    }

    #[tokio::test]
    async fn tokens_for_unknown_residents_are_rejected() {
        let state = test_state().await;
        seed_community(&state).await;

        let token = AuthService::create_jwt(&state, "ghost", TENANT).expect("jwt");
        assert!(matches!(
            AuthService::viewer_from_token(&state, &token).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            AuthService::viewer_from_token(&state, "not-a-jwt").await,
            Err(AppError::Jwt(_))
        ));
    }
}
