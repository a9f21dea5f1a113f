use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{LifecycleEvent, MatchId, PaymentStatus};
use crate::services::notifier::Notifier;

/// Errors that can occur when calling an external collaborator
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Identity verification collaborator
#[async_trait]
pub trait VerificationService: Send + Sync {
    async fn is_verified(&self, participant_id: &str) -> Result<bool, CollaboratorError>;
}

/// Payment collaborator
#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn capture(
        &self,
        participant_id: &str,
        amount_cents: u64,
    ) -> Result<PaymentStatus, CollaboratorError>;

    async fn refund(
        &self,
        participant_id: &str,
        match_id: Option<MatchId>,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct VerificationBody {
    verified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaptureBody<'a> {
    participant_id: &'a str,
    amount_cents: u64,
}

#[derive(Debug, Deserialize)]
struct CaptureResult {
    status: PaymentStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundBody<'a> {
    participant_id: &'a str,
    match_id: Option<MatchId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationBody<'a> {
    participant_id: &'a str,
    #[serde(flatten)]
    event: &'a LifecycleEvent,
}

/// HTTP client for the verification, payment and notification collaborators
///
/// Positive verification answers are cached in memory for a short TTL; a
/// participant that is still pending is asked again on every call.
pub struct HttpCollaborators {
    verification_url: String,
    payment_url: String,
    notification_url: Option<String>,
    api_key: String,
    client: Client,
    verified_cache: moka::future::Cache<String, bool>,
}

impl HttpCollaborators {
    pub fn new(
        verification_url: String,
        payment_url: String,
        notification_url: Option<String>,
        api_key: String,
        timeout: Duration,
        cache_size: u64,
        cache_ttl: Duration,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build()?;

        let verified_cache = moka::future::CacheBuilder::new(cache_size)
            .time_to_live(cache_ttl)
            .build();

        Ok(Self {
            verification_url: verification_url.trim_end_matches('/').to_string(),
            payment_url: payment_url.trim_end_matches('/').to_string(),
            notification_url: notification_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
            client,
            verified_cache,
        })
    }

    fn check_status(status: StatusCode, what: &str) -> Result<(), CollaboratorError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CollaboratorError::Unauthorized);
        }
        if !status.is_success() {
            return Err(CollaboratorError::ApiError(format!("{} failed: {}", what, status)));
        }
        Ok(())
    }
}

#[async_trait]
impl VerificationService for HttpCollaborators {
    async fn is_verified(&self, participant_id: &str) -> Result<bool, CollaboratorError> {
        if let Some(true) = self.verified_cache.get(participant_id).await {
            tracing::trace!("Verification cache hit: {}", participant_id);
            return Ok(true);
        }

        let url = format!(
            "{}/participants/{}/verification",
            self.verification_url,
            urlencoding::encode(participant_id)
        );

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        // Unknown participants are simply not verified yet
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check_status(response.status(), "Verification lookup")?;

        let body: VerificationBody = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        if body.verified {
            self.verified_cache
                .insert(participant_id.to_string(), true)
                .await;
        }

        Ok(body.verified)
    }
}

#[async_trait]
impl PaymentService for HttpCollaborators {
    async fn capture(
        &self,
        participant_id: &str,
        amount_cents: u64,
    ) -> Result<PaymentStatus, CollaboratorError> {
        let url = format!("{}/captures", self.payment_url);

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&CaptureBody {
                participant_id,
                amount_cents,
            })
            .send()
            .await?;

        Self::check_status(response.status(), "Payment capture")?;

        let result: CaptureResult = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            "Captured {} cents for {}: {}",
            amount_cents,
            participant_id,
            result.status
        );

        Ok(result.status)
    }

    async fn refund(
        &self,
        participant_id: &str,
        match_id: Option<MatchId>,
    ) -> Result<(), CollaboratorError> {
        let url = format!("{}/refunds", self.payment_url);

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&RefundBody {
                participant_id,
                match_id,
            })
            .send()
            .await?;

        Self::check_status(response.status(), "Refund")
    }
}

#[async_trait]
impl Notifier for HttpCollaborators {
    async fn notify(
        &self,
        participant_id: &str,
        event: &LifecycleEvent,
    ) -> Result<(), CollaboratorError> {
        let Some(base) = &self.notification_url else {
            tracing::debug!("No notification endpoint, dropping {} for {}", event.name(), participant_id);
            return Ok(());
        };

        let response = self
            .client
            .post(format!("{}/notifications", base))
            .header("X-Api-Key", &self.api_key)
            .json(&NotificationBody {
                participant_id,
                event,
            })
            .send()
            .await?;

        Self::check_status(response.status(), "Notification")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> HttpCollaborators {
        HttpCollaborators::new(
            server.url(),
            server.url(),
            Some(server.url()),
            "test-key".to_string(),
            Duration::from_secs(5),
            100,
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_positive_verification_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/participants/p-1/verification")
            .match_header("x-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"verified": true}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);

        assert!(client.is_verified("p-1").await.unwrap());
        assert!(client.is_verified("p-1").await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_participant_is_not_verified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/participants/ghost/verification")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);

        assert!(!client.is_verified("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_capture_returns_payment_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/captures")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "participantId": "p-1",
                "amountCents": 2500
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "paid"}"#)
            .create_async()
            .await;

        let client = client_for(&server);

        assert_eq!(client.capture("p-1", 2500).await.unwrap(), PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_unauthorized_capture() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/captures")
            .with_status(401)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.capture("p-1", 2500).await.unwrap_err();

        assert!(matches!(err, CollaboratorError::Unauthorized));
    }

    #[tokio::test]
    async fn test_notification_posts_event() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notifications")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "participantId": "p-1",
                "event": "match_expired"
            })))
            .with_status(202)
            .create_async()
            .await;

        let client = client_for(&server);
        let event = LifecycleEvent::MatchExpired {
            match_id: uuid::Uuid::new_v4(),
        };

        client.notify("p-1", &event).await.unwrap();
        mock.assert_async().await;
    }
}
