//! HTTP implementation of [`RsvpWriter`] against the engagement API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::services::engagement::{RsvpOutcome, RsvpRequest};
use crate::services::sync_bus::RsvpWriter;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct HttpRsvpWriter {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpRsvpWriter {
    pub fn new(base_url: &str, token: impl Into<String>) -> AppResult<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| AppError::Config(format!("Invalid API URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    fn rsvp_url(&self, occurrence_id: &str) -> AppResult<Url> {
        self.base_url
            .join(&format!("api/engagement/{}/rsvp", occurrence_id))
            .map_err(|e| AppError::BadRequest(format!("Invalid occurrence id: {}", e)))
    }
}

/// Map an API error status back onto the shared error taxonomy.
fn error_for(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::UNPROCESSABLE_ENTITY => AppError::Validation(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        StatusCode::UNAUTHORIZED => AppError::Unauthorized,
        StatusCode::FORBIDDEN => AppError::Forbidden,
        StatusCode::BAD_REQUEST => AppError::BadRequest(message),
        _ => AppError::TransientWrite(message),
    }
}

#[async_trait]
impl RsvpWriter for HttpRsvpWriter {
    async fn write_rsvp(&self, occurrence_id: &str, request: &RsvpRequest) -> AppResult<RsvpOutcome> {
        let url = self.rsvp_url(occurrence_id)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("RSVP request failed: {}", e);
                AppError::TransientWrite("Could not reach the server".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(error_for(status, message));
        }

        response.json::<RsvpOutcome>().await.map_err(|e| {
            tracing::warn!("Unreadable RSVP response: {}", e);
            AppError::TransientWrite("Unexpected response from the server".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_onto_the_taxonomy() {
        assert!(matches!(
            error_for(StatusCode::NOT_FOUND, "x".into()),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            error_for(StatusCode::CONFLICT, "x".into()),
            AppError::Conflict(_)
        ));
        assert!(error_for(StatusCode::SERVICE_UNAVAILABLE, "x".into()).is_transient());
        assert!(error_for(StatusCode::TOO_MANY_REQUESTS, "x".into()).is_transient());
        assert!(!error_for(StatusCode::UNPROCESSABLE_ENTITY, "x".into()).is_transient());
    }

    #[test]
    fn base_urls_without_trailing_slash_keep_their_path() {
        let writer = HttpRsvpWriter::new("http://localhost:8080/community", "t").expect("writer");
        assert_eq!(
            writer.rsvp_url("abc").expect("url").as_str(),
            "http://localhost:8080/community/api/engagement/abc/rsvp"
        );
    }
}
