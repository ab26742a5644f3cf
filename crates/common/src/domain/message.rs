use crate::domain::result::{DomainError, DomainResult};
use crate::geo::GeoPoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

const ALERT_SUB_TYPES: [&str; 5] = ["SENSOR", "PANIC", "NS-PANIC", "UNKNOWN", "DISTRESS"];
const ALARM_SUB_TYPES: [&str; 3] = ["PA", "PM", "SERVICE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Alert,
    Alarm,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Alert => "alert",
            MessageType::Alarm => "alarm",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alert" => Ok(MessageType::Alert),
            "alarm" => Ok(MessageType::Alarm),
            other => Err(DomainError::InvalidMessageType(other.to_string())),
        }
    }
}

/// Sub-type extracted from `payload.type`, stored in one of two columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSubType {
    pub alert_type: Option<String>,
    pub alarm_type: Option<String>,
}

impl MessageSubType {
    pub fn derive(message_type: MessageType, payload: &Value) -> Self {
        let raw = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_uppercase();

        match message_type {
            MessageType::Alert if ALERT_SUB_TYPES.contains(&raw.as_str()) => Self {
                alert_type: Some(raw.to_lowercase().replace('-', "_")),
                alarm_type: None,
            },
            MessageType::Alarm => {
                // SERVICE-CHILDCARE and friends collapse onto their prefix
                let prefix = raw.split('-').next().unwrap_or_default();
                let known = ALARM_SUB_TYPES.contains(&raw.as_str())
                    || (prefix == "SERVICE" && raw.starts_with("SERVICE-"));
                Self {
                    alert_type: None,
                    alarm_type: known.then(|| prefix.to_lowercase()),
                }
            }
            MessageType::Alert => Self::default(),
        }
    }

    /// The populated column, if any
    pub fn value(&self) -> Option<&str> {
        self.alert_type.as_deref().or(self.alarm_type.as_deref())
    }
}

/// Immutable device event. Only the read-tracking fields change, on acknowledge.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: i64,
    pub message_type: MessageType,
    pub alert_type: Option<String>,
    pub alarm_type: Option<String>,
    pub payload: Value,
    pub source_device_id: i64,
    pub user: Option<String>,
    /// Broadcast name (`payload.bcname`)
    pub bcname: Option<String>,
    /// `payload.to`
    pub recipient: Option<String>,
    /// `payload.co`
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub last_read_at: Option<DateTime<Utc>>,
    pub last_modified_read: Option<DateTime<Utc>>,
    pub acknowledge_status: Option<String>,
}

impl Message {
    /// Message-level NID override carried in the payload, as raw text
    pub fn nid_override(&self) -> Option<String> {
        payload_nid(&self.payload)
    }

    /// Position carried in the payload, when well-formed
    pub fn position(&self) -> Option<GeoPoint> {
        payload_position(&self.payload).and_then(Result::ok)
    }
}

/// Raw NID text from `payload.nid`; numbers are rendered in decimal
pub fn payload_nid(payload: &Value) -> Option<String> {
    match payload.get("nid")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `payload.position` parsed into a point. `None` when absent, `Some(Err)` when malformed.
pub fn payload_position(payload: &Value) -> Option<DomainResult<GeoPoint>> {
    let position = payload.get("position")?;
    if position.is_null() {
        return None;
    }

    let coord = |key: &str| position.get(key).and_then(Value::as_f64);
    Some(match (coord("latitude"), coord("longitude")) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
        _ => Err(DomainError::ValidationError(
            "position must carry numeric latitude and longitude".to_string(),
        )),
    })
}

/// Text field from the payload, trying each key in order
pub fn payload_text(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| payload.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Input for persisting a new message
#[derive(Debug, Clone, PartialEq)]
pub struct CreateMessageRepoInput {
    pub message_type: MessageType,
    pub sub_type: MessageSubType,
    pub payload: Value,
    pub source_device_id: i64,
    pub user: Option<String>,
    pub bcname: Option<String>,
    pub recipient: Option<String>,
    pub contact: Option<String>,
}

/// Repository trait for message persistence operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create_message(&self, input: CreateMessageRepoInput) -> DomainResult<Message>;

    async fn get_message(&self, message_id: i64) -> DomainResult<Option<Message>>;
}
