use crate::domain::{WebhookClient, WebhookPayload};
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookClientConfig {
    /// Bound on the whole request, connect included
    pub timeout: Duration,
}

impl Default for WebhookClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// Webhook transport over a shared reqwest connection pool
pub struct ReqwestWebhookClient {
    client: reqwest::Client,
}

impl ReqwestWebhookClient {
    pub fn new(config: WebhookClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookClient for ReqwestWebhookClient {
    async fn deliver(&self, url: &str, payload: &WebhookPayload) -> DomainResult<()> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection error"
                } else {
                    "request error"
                };
                DomainError::TransportFailure(format!("{}: {}", kind, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::TransportFailure(format!("HTTP {}", status)));
        }

        debug!(%status, message_id = payload.message_id, "webhook accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::MessageType;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> WebhookPayload {
        WebhookPayload {
            message_id: 42,
            message_type: MessageType::Alert,
            alert_type: Some("sensor".to_string()),
            alarm_type: None,
            payload: json!({"type": "SENSOR", "value": 3}),
            timestamp: "2025-03-01T12:30:00+00:00".to_string(),
            source_device_hid: "src-1".to_string(),
            user: None,
        }
    }

    fn client(timeout: Duration) -> ReqwestWebhookClient {
        ReqwestWebhookClient::new(WebhookClientConfig { timeout }).unwrap()
    }

    #[tokio::test]
    async fn test_posts_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "message_id": 42,
                "type": "alert",
                "alert_type": "sensor",
                "alarm_type": null,
                "payload": {"type": "SENSOR", "value": 3},
                "timestamp": "2025-03-01T12:30:00+00:00",
                "source_device_hid": "src-1",
                "user": null
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/webhook", server.uri());
        client(Duration::from_secs(5))
            .deliver(&url, &payload())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(Duration::from_secs(5))
            .deliver(&format!("{}/webhook", server.uri()), &payload())
            .await;

        match result {
            Err(DomainError::TransportFailure(reason)) => assert!(reason.contains("500")),
            other => panic!("expected TransportFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client(Duration::from_secs(5))
            .deliver(&server.uri(), &payload())
            .await;
        assert!(matches!(result, Err(DomainError::TransportFailure(_))));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let result = client(Duration::from_millis(50))
            .deliver(&server.uri(), &payload())
            .await;

        match result {
            Err(DomainError::TransportFailure(reason)) => assert!(reason.starts_with("timeout")),
            other => panic!("expected TransportFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_failure() {
        let server = MockServer::start().await;
        let url = server.uri();
        drop(server);

        let result = client(Duration::from_secs(2)).deliver(&url, &payload()).await;
        assert!(matches!(result, Err(DomainError::TransportFailure(_))));
    }
}
