//! Webhook notification channel
//!
//! Posts change notifications as JSON to a configured URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::ChangeNotification;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Delivery retry policy
    #[serde(default = "default_retry")]
    pub retry: RetryConfig,
}

fn default_timeout() -> u64 {
    10
}

fn default_retry() -> RetryConfig {
    RetryConfig::with_delays(2, 500, 4_000)
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: std::collections::HashMap::new(),
            timeout_secs: default_timeout(),
            retry: default_retry(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Webhook URL cannot be empty".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Webhook notification channel
///
/// # Payload Format
///
/// ```json
/// {
///   "event": "change_alert",
///   "job_id": "4f1c...",
///   "url": "https://shop.example.com/item/42",
///   "cycle": 3,
///   "fraction": 0.5,
///   "changed_fields": ["price"],
///   "snapshot": {"price": "19.99", "title": "Widget"},
///   "detected_at": "2024-01-01T12:05:00Z"
/// }
/// ```
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    /// Create a new webhook channel
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Create a simple webhook channel with just a URL
    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    /// Get the webhook URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_payload(&self, notification: &ChangeNotification) -> serde_json::Value {
        serde_json::json!({
            "event": "change_alert",
            "job_id": notification.job_id,
            "url": notification.url,
            "cycle": notification.cycle,
            "fraction": notification.fraction,
            "changed_fields": notification.changed_fields,
            "snapshot": notification.snapshot,
            "detected_at": notification.detected_at.to_rfc3339(),
        })
    }

    async fn post_once(&self, payload: &serde_json::Value) -> ChannelResult<()> {
        let mut request = self.client.post(&self.config.url);

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        if status.is_client_error() {
            Err(ChannelError::Rejected {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(ChannelError::Unavailable {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &ChangeNotification) -> DeliveryStatus {
        let payload = self.build_payload(notification);

        let result = with_retry_if(
            &self.config.retry,
            || self.post_once(&payload),
            ChannelError::is_retryable,
        )
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    job_id = %notification.job_id,
                    webhook = %self.config.url,
                    "Change notification delivered"
                );
                DeliveryStatus::success_with_message(
                    "webhook",
                    format!("Delivered to {}", self.config.url),
                )
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %notification.job_id,
                    webhook = %self.config.url,
                    error = %e,
                    "Change notification not delivered"
                );
                DeliveryStatus::failure("webhook", e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobId;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notification() -> ChangeNotification {
        ChangeNotification {
            job_id: JobId::new(),
            url: String::from("https://shop.example.com/item/42"),
            cycle: 2,
            fraction: 0.5,
            changed_fields: vec![String::from("price")],
            snapshot: serde_json::json!({"price": "19.99", "title": "Widget"}),
            detected_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_webhook_config_validation() {
        assert!(WebhookConfig::new("https://example.com/webhook").validate().is_ok());
        assert!(WebhookConfig::new("").validate().is_err());
        assert!(WebhookConfig::new("example.com/webhook").validate().is_err());
        let mut config = WebhookConfig::new("https://example.com");
        config.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_webhook_from_url() {
        assert!(WebhookChannel::from_url("https://example.com/alerts").is_ok());
        assert!(WebhookChannel::from_url("not-a-url").is_err());
    }

    #[test]
    fn test_webhook_payload_building() {
        let channel = WebhookChannel::from_url("https://example.com/webhook").unwrap();
        let payload = channel.build_payload(&notification());

        assert_eq!(payload["event"], "change_alert");
        assert_eq!(payload["fraction"], 0.5);
        assert_eq!(payload["changed_fields"][0], "price");
        assert!(payload["detected_at"].is_string());
    }

    #[tokio::test]
    async fn test_webhook_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = WebhookConfig::new(format!("{}/hook", server.uri()));
        config.auth_token = Some(String::from("secret"));
        let channel = WebhookChannel::new(config).unwrap();
        let status = channel.send(&notification()).await;
        assert!(status.success);
    }

    #[tokio::test]
    async fn test_webhook_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::from_url(format!("{}/hook", server.uri())).unwrap();
        let status = channel.send(&notification()).await;
        assert!(!status.success);
    }

    #[tokio::test]
    async fn test_webhook_server_error_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let mut config = WebhookConfig::new(format!("{}/hook", server.uri()));
        config.retry = RetryConfig::with_delays(1, 10, 10);
        let channel = WebhookChannel::new(config).unwrap();
        let status = channel.send(&notification()).await;
        assert!(!status.success);
    }
}
