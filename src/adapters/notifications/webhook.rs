//! Webhook notification sink. POSTs each batch as JSON to a configured URL.

use crate::domain::{DomainError, Notification};
use crate::ports::NotificationSink;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Delivers notifications to an HTTP endpoint.
///
/// Body: `{"notifications": [{user_id, group_id, type, title, body, metadata}, ...]}`.
/// Any non-2xx response is a `DomainError::Notification`.
pub struct WebhookNotificationSink {
    client: Arc<Client>,
    url: String,
    token: Option<String>,
}

impl WebhookNotificationSink {
    /// # Arguments
    /// * `url` - endpoint receiving the POST
    /// * `token` - optional bearer token sent in `Authorization`
    /// * `timeout` - per-request timeout
    pub fn new(url: String, token: Option<String>, timeout: Duration) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Notification(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
            url,
            token,
        })
    }
}

#[async_trait::async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn create_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<(), DomainError> {
        let body = serde_json::json!({ "notifications": notifications });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let res = request
            .send()
            .await
            .map_err(|e| DomainError::Notification(format!("Request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(DomainError::Notification(format!(
                "Webhook error {status}: {text}"
            )));
        }

        debug!(url = %self.url, count = notifications.len(), "Webhook accepted notifications");
        Ok(())
    }
}
