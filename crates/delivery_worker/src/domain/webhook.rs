use async_trait::async_trait;
use common::domain::{DeliveryContext, DomainResult, MessageType};
use serde::Serialize;
use serde_json::Value;

/// JSON body POSTed to a device's webhook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub message_id: i64,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub alert_type: Option<String>,
    pub alarm_type: Option<String>,
    pub payload: Value,
    /// RFC 3339 creation time of the message
    pub timestamp: String,
    pub source_device_hid: String,
    pub user: Option<String>,
}

impl From<&DeliveryContext> for WebhookPayload {
    fn from(ctx: &DeliveryContext) -> Self {
        let message = &ctx.message;
        Self {
            message_id: message.message_id,
            message_type: message.message_type,
            alert_type: message.alert_type.clone(),
            alarm_type: message.alarm_type.clone(),
            payload: message.payload.clone(),
            timestamp: message.created_at.to_rfc3339(),
            source_device_hid: ctx.source_hardware_id.clone(),
            user: message.user.clone(),
        }
    }
}

/// Outbound webhook transport.
///
/// Implementations return `DomainError::TransportFailure` for non-2xx
/// responses, connection errors and timeouts. Any other error is treated
/// as an internal failure by the caller.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn deliver(&self, url: &str, payload: &WebhookPayload) -> DomainResult<()>;
}
