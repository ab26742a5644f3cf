use crate::domain::{
    CreateMessageRepoInput, DomainError, DomainResult, Message, MessageRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, info};

/// Column list for `messages m`; read back with [`MessageRow::from_row`]
pub(crate) const MESSAGE_COLUMNS: &str = "m.message_id, m.message_type, m.alert_type, m.alarm_type, \
     m.payload, m.source_device_id, m.user_tag, m.bcname, m.recipient, m.contact, m.created_at, \
     m.read, m.last_read_at, m.last_modified_read, m.acknowledge_status";

pub(crate) const MESSAGE_COLUMN_COUNT: usize = 15;

/// Message row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub message_id: i64,
    pub message_type: String,
    pub alert_type: Option<String>,
    pub alarm_type: Option<String>,
    pub payload: serde_json::Value,
    pub source_device_id: i64,
    pub user_tag: Option<String>,
    pub bcname: Option<String>,
    pub recipient: Option<String>,
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub last_read_at: Option<DateTime<Utc>>,
    pub last_modified_read: Option<DateTime<Utc>>,
    pub acknowledge_status: Option<String>,
}

impl MessageRow {
    /// Read [`MESSAGE_COLUMNS`] starting at column `start`
    pub(crate) fn from_row(row: &Row, start: usize) -> Self {
        Self {
            message_id: row.get(start),
            message_type: row.get(start + 1),
            alert_type: row.get(start + 2),
            alarm_type: row.get(start + 3),
            payload: row.get(start + 4),
            source_device_id: row.get(start + 5),
            user_tag: row.get(start + 6),
            bcname: row.get(start + 7),
            recipient: row.get(start + 8),
            contact: row.get(start + 9),
            created_at: row.get(start + 10),
            read: row.get(start + 11),
            last_read_at: row.get(start + 12),
            last_modified_read: row.get(start + 13),
            acknowledge_status: row.get(start + 14),
        }
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = DomainError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            message_id: row.message_id,
            message_type: row.message_type.parse()?,
            alert_type: row.alert_type,
            alarm_type: row.alarm_type,
            payload: row.payload,
            source_device_id: row.source_device_id,
            user: row.user_tag,
            bcname: row.bcname,
            recipient: row.recipient,
            contact: row.contact,
            created_at: row.created_at,
            read: row.read,
            last_read_at: row.last_read_at,
            last_modified_read: row.last_modified_read,
            acknowledge_status: row.acknowledge_status,
        })
    }
}

#[derive(Clone)]
pub struct PostgresMessageRepository {
    client: PostgresClient,
}

impl PostgresMessageRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn create_message(&self, input: CreateMessageRepoInput) -> DomainResult<Message> {
        debug!(
            source_device_id = input.source_device_id,
            message_type = %input.message_type,
            "creating message in database"
        );

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO messages AS m (message_type, alert_type, alarm_type, payload,
                         source_device_id, user_tag, bcname, recipient, contact, created_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                     RETURNING {}",
                    MESSAGE_COLUMNS
                ),
                &[
                    &input.message_type.as_str(),
                    &input.sub_type.alert_type,
                    &input.sub_type.alarm_type,
                    &input.payload,
                    &input.source_device_id,
                    &input.user,
                    &input.bcname,
                    &input.recipient,
                    &input.contact,
                    &now,
                ],
            )
            .await
            .map_err(|e| {
                if let Some(db_err) = e.as_db_error() {
                    // foreign_key_violation
                    if db_err.code().code() == "23503" {
                        return DomainError::DeviceNotFound(input.source_device_id.to_string());
                    }
                }
                DomainError::RepositoryError(e.into())
            })?;

        let message = Message::try_from(MessageRow::from_row(&row, 0))?;
        info!(message_id = message.message_id, "message created in database");
        Ok(message)
    }

    async fn get_message(&self, message_id: i64) -> DomainResult<Option<Message>> {
        debug!(message_id, "getting message from database");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM messages m WHERE m.message_id = $1",
                    MESSAGE_COLUMNS
                ),
                &[&message_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.map(|row| Message::try_from(MessageRow::from_row(&row, 0)))
            .transpose()
    }
}
