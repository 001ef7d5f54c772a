//! Client for the server-side push subscription endpoints.
//!
//! The wider notification REST API belongs to the server; the engine itself
//! only ever registers and removes push subscriptions.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::models::PushSubscriptionData;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Server boundary for subscription registration. Kept as a trait so tests
/// can count and fail calls without a live server.
#[trait_variant::make(Send)]
pub trait SubscriptionGateway {
    async fn register(
        &self,
        subscription: &PushSubscriptionData,
        device_type: &str,
        device_name: &str,
    ) -> Result<(), ApiError>;

    async fn remove(&self, endpoint: &str) -> Result<(), ApiError>;
}

pub struct NotificationApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl NotificationApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
        }
    }

    fn subscriptions_url(&self) -> String {
        format!("{}/api/notifications/subscriptions", self.base_url)
    }
}

impl SubscriptionGateway for NotificationApiClient {
    async fn register(
        &self,
        subscription: &PushSubscriptionData,
        device_type: &str,
        device_name: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "subscription_json": serde_json::to_string(subscription)?,
            "device_type": device_type,
            "device_name": device_name,
        });
        debug!(endpoint = %subscription.endpoint, "registering push subscription with server");
        let response = self
            .http
            .post(self.subscriptions_url())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(())
    }

    async fn remove(&self, endpoint: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "endpoint": endpoint });
        debug!(endpoint = %endpoint, "removing push subscription from server");
        let response = self
            .http
            .delete(self.subscriptions_url())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = NotificationApiClient::new("http://localhost:8000/");
        assert_eq!(
            client.subscriptions_url(),
            "http://localhost:8000/api/notifications/subscriptions"
        );
    }
}
