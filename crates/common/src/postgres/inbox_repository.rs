use crate::domain::{
    AcknowledgeInboxRepoInput, AcknowledgedInbox, CreateInboxEntryOutcome,
    CreateInboxEntryRepoInput, DeliveryContext, Device, DomainError, DomainResult, InboxEntry,
    InboxRepository, ListPendingInboxRepoInput, Message, PendingInboxItem, RecoverableDelivery,
};
use crate::nid::Nid;
use crate::postgres::device_repository::{DeviceRow, DEVICE_COLUMNS, DEVICE_COLUMN_COUNT};
use crate::postgres::message_repository::{MessageRow, MESSAGE_COLUMNS, MESSAGE_COLUMN_COUNT};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, info, instrument};

const INBOX_COLUMNS: &str = "i.inbox_id, i.device_id, i.message_id, i.status, \
     i.delivery_attempts, i.created_at, i.delivered_at, i.acknowledged_at";

const INBOX_COLUMN_COUNT: usize = 8;

/// Inbox row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct InboxRow {
    pub inbox_id: i64,
    pub device_id: i64,
    pub message_id: i64,
    pub status: String,
    pub delivery_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl InboxRow {
    fn from_row(row: &Row, start: usize) -> Self {
        Self {
            inbox_id: row.get(start),
            device_id: row.get(start + 1),
            message_id: row.get(start + 2),
            status: row.get(start + 3),
            delivery_attempts: row.get(start + 4),
            created_at: row.get(start + 5),
            delivered_at: row.get(start + 6),
            acknowledged_at: row.get(start + 7),
        }
    }
}

impl TryFrom<InboxRow> for InboxEntry {
    type Error = DomainError;

    fn try_from(row: InboxRow) -> Result<Self, Self::Error> {
        Ok(InboxEntry {
            inbox_id: row.inbox_id,
            device_id: row.device_id,
            message_id: row.message_id,
            status: row.status.parse()?,
            delivery_attempts: u32::try_from(row.delivery_attempts).unwrap_or(0),
            created_at: row.created_at,
            delivered_at: row.delivered_at,
            acknowledged_at: row.acknowledged_at,
        })
    }
}

fn entry_at(row: &Row, start: usize) -> DomainResult<InboxEntry> {
    InboxEntry::try_from(InboxRow::from_row(row, start))
}

fn message_at(row: &Row, start: usize) -> DomainResult<Message> {
    Message::try_from(MessageRow::from_row(row, start))
}

fn device_at(row: &Row, start: usize) -> DomainResult<Device> {
    Device::try_from(DeviceRow::from_row(row, start))
}

fn db_err(e: tokio_postgres::Error) -> DomainError {
    DomainError::RepositoryError(e.into())
}

#[derive(Clone)]
pub struct PostgresInboxRepository {
    client: PostgresClient,
}

impl PostgresInboxRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InboxRepository for PostgresInboxRepository {
    async fn create_entry_if_absent(
        &self,
        input: CreateInboxEntryRepoInput,
    ) -> DomainResult<CreateInboxEntryOutcome> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();

        let inserted = conn
            .query_opt(
                &format!(
                    "INSERT INTO device_inbox AS i (device_id, message_id, status, delivery_attempts, created_at)
                     VALUES ($1, $2, 'pending', 0, $3)
                     ON CONFLICT (device_id, message_id) DO NOTHING
                     RETURNING {}",
                    INBOX_COLUMNS
                ),
                &[&input.device_id, &input.message_id, &now],
            )
            .await
            .map_err(db_err)?;

        if let Some(row) = inserted {
            let entry = entry_at(&row, 0)?;
            debug!(
                inbox_id = entry.inbox_id,
                device_id = input.device_id,
                message_id = input.message_id,
                "inbox entry created"
            );
            return Ok(CreateInboxEntryOutcome {
                entry,
                created: true,
            });
        }

        let row = conn
            .query_one(
                &format!(
                    "SELECT {} FROM device_inbox i WHERE i.device_id = $1 AND i.message_id = $2",
                    INBOX_COLUMNS
                ),
                &[&input.device_id, &input.message_id],
            )
            .await
            .map_err(db_err)?;

        debug!(
            device_id = input.device_id,
            message_id = input.message_id,
            "inbox entry already exists"
        );

        Ok(CreateInboxEntryOutcome {
            entry: entry_at(&row, 0)?,
            created: false,
        })
    }

    #[instrument(skip(self), fields(device_id = input.device_id))]
    async fn list_pending(
        &self,
        input: ListPendingInboxRepoInput,
    ) -> DomainResult<Vec<PendingInboxItem>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let source_nid = input.source_nid.map(Nid::to_i64);

        let rows = conn
            .query(
                &format!(
                    "SELECT {}, {}, src.hardware_id
                     FROM device_inbox i
                     JOIN messages m ON m.message_id = i.message_id
                     JOIN devices src ON src.device_id = m.source_device_id
                     WHERE i.device_id = $1
                       AND i.status = 'pending'
                       AND ($2::TEXT IS NULL OR m.user_tag = $2)
                       AND ($3::BIGINT IS NULL OR src.nid = $3)
                       AND ($4::TEXT IS NULL OR src.hardware_id = $4)
                     ORDER BY i.created_at, i.inbox_id",
                    INBOX_COLUMNS, MESSAGE_COLUMNS
                ),
                &[
                    &input.device_id,
                    &input.user,
                    &source_nid,
                    &input.source_hardware_id,
                ],
            )
            .await
            .map_err(db_err)?;

        let hid_col = INBOX_COLUMN_COUNT + MESSAGE_COLUMN_COUNT;
        rows.iter()
            .map(|row| {
                Ok(PendingInboxItem {
                    entry: entry_at(row, 0)?,
                    message: message_at(row, INBOX_COLUMN_COUNT)?,
                    source_hardware_id: row.get(hid_col),
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(device_id = input.device_id, message_id = input.message_id))]
    async fn acknowledge(
        &self,
        input: AcknowledgeInboxRepoInput,
    ) -> DomainResult<Option<AcknowledgedInbox>> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn.transaction().await.map_err(db_err)?;

        let entry_row = tx
            .query_opt(
                &format!(
                    "UPDATE device_inbox i
                     SET status = 'acknowledged',
                         acknowledged_at = COALESCE(i.acknowledged_at, $3)
                     WHERE i.device_id = $1 AND i.message_id = $2
                     RETURNING {}",
                    INBOX_COLUMNS
                ),
                &[&input.device_id, &input.message_id, &input.acknowledged_at],
            )
            .await
            .map_err(db_err)?;

        let Some(entry_row) = entry_row else {
            debug!("no inbox entry for pair");
            return Ok(None);
        };

        let message_row = tx
            .query_one(
                &format!(
                    "UPDATE messages m
                     SET read = TRUE,
                         last_read_at = COALESCE(m.last_read_at, $2),
                         last_modified_read = $2,
                         acknowledge_status = 'YES'
                     WHERE m.message_id = $1
                     RETURNING {}",
                    MESSAGE_COLUMNS
                ),
                &[&input.message_id, &input.acknowledged_at],
            )
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        info!("inbox entry acknowledged");

        Ok(Some(AcknowledgedInbox {
            entry: entry_at(&entry_row, 0)?,
            message: message_at(&message_row, 0)?,
        }))
    }

    async fn get_delivery_context(&self, inbox_id: i64) -> DomainResult<Option<DeliveryContext>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {}, {}, {}, src.hardware_id
                     FROM device_inbox i
                     JOIN devices d ON d.device_id = i.device_id
                     JOIN messages m ON m.message_id = i.message_id
                     JOIN devices src ON src.device_id = m.source_device_id
                     WHERE i.inbox_id = $1",
                    INBOX_COLUMNS, DEVICE_COLUMNS, MESSAGE_COLUMNS
                ),
                &[&inbox_id],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let message_start = INBOX_COLUMN_COUNT + DEVICE_COLUMN_COUNT;
        Ok(Some(DeliveryContext {
            entry: entry_at(&row, 0)?,
            device: device_at(&row, INBOX_COLUMN_COUNT)?,
            message: message_at(&row, message_start)?,
            source_hardware_id: row.get(message_start + MESSAGE_COLUMN_COUNT),
        }))
    }

    async fn mark_delivered(
        &self,
        inbox_id: i64,
        delivered_at: DateTime<Utc>,
    ) -> DomainResult<Option<InboxEntry>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "UPDATE device_inbox i
                     SET status = 'delivered', delivered_at = $2
                     WHERE i.inbox_id = $1 AND i.status = 'pending'
                     RETURNING {}",
                    INBOX_COLUMNS
                ),
                &[&inbox_id, &delivered_at],
            )
            .await
            .map_err(db_err)?;

        row.map(|row| entry_at(&row, 0)).transpose()
    }

    async fn record_failed_attempt(
        &self,
        inbox_id: i64,
        retry_limit: u32,
    ) -> DomainResult<Option<InboxEntry>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let limit = i32::try_from(retry_limit).unwrap_or(i32::MAX);

        let row = conn
            .query_opt(
                &format!(
                    "UPDATE device_inbox i
                     SET delivery_attempts = i.delivery_attempts + 1,
                         status = CASE WHEN i.delivery_attempts + 1 >= $2 THEN 'failed' ELSE 'pending' END
                     WHERE i.inbox_id = $1 AND i.status = 'pending'
                     RETURNING {}",
                    INBOX_COLUMNS
                ),
                &[&inbox_id, &limit],
            )
            .await
            .map_err(db_err)?;

        row.map(|row| entry_at(&row, 0)).transpose()
    }

    async fn list_recoverable_deliveries(&self) -> DomainResult<Vec<RecoverableDelivery>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT i.inbox_id, m.message_type
                 FROM device_inbox i
                 JOIN devices d ON d.device_id = i.device_id
                 JOIN messages m ON m.message_id = i.message_id
                 WHERE i.status = 'pending'
                   AND d.active
                   AND d.webhook_url IS NOT NULL
                   AND btrim(d.webhook_url) <> ''
                   AND (i.delivery_attempts = 0 OR i.delivery_attempts < d.retry_limit)
                 ORDER BY i.created_at, i.inbox_id",
                &[],
            )
            .await
            .map_err(db_err)?;

        debug!(count = rows.len(), "listed recoverable deliveries");

        rows.iter()
            .map(|row| {
                let message_type: String = row.get(1);
                Ok(RecoverableDelivery {
                    inbox_id: row.get(0),
                    message_type: message_type.parse()?,
                })
            })
            .collect()
    }
}
