use crate::domain::device::Device;
use crate::domain::message::{Message, MessageType};
use crate::domain::result::{DomainError, DomainResult};
use crate::nid::Nid;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboxStatus {
    Pending,
    Delivered,
    Acknowledged,
    Failed,
}

impl InboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InboxStatus::Pending => "pending",
            InboxStatus::Delivered => "delivered",
            InboxStatus::Acknowledged => "acknowledged",
            InboxStatus::Failed => "failed",
        }
    }

    /// No further delivery attempts are made from these states
    pub fn is_terminal_for_delivery(self) -> bool {
        !matches!(self, InboxStatus::Pending)
    }
}

impl fmt::Display for InboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InboxStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InboxStatus::Pending),
            "delivered" => Ok(InboxStatus::Delivered),
            "acknowledged" => Ok(InboxStatus::Acknowledged),
            "failed" => Ok(InboxStatus::Failed),
            other => Err(DomainError::InvalidInboxStatus(other.to_string())),
        }
    }
}

/// Per-device delivery record; unique per (device, message)
#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntry {
    pub inbox_id: i64,
    pub device_id: i64,
    pub message_id: i64,
    pub status: InboxStatus,
    pub delivery_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Result of an idempotent insert
#[derive(Debug, Clone, PartialEq)]
pub struct CreateInboxEntryOutcome {
    pub entry: InboxEntry,
    /// False when the (device, message) pair already existed
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInboxEntryRepoInput {
    pub device_id: i64,
    pub message_id: i64,
}

/// Filters for the pending-inbox read projection.
/// `source_nid` and `source_hardware_id` apply to the message's source device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPendingInboxRepoInput {
    pub device_id: i64,
    pub user: Option<String>,
    pub source_nid: Option<Nid>,
    pub source_hardware_id: Option<String>,
}

/// A pending entry joined with its message
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInboxItem {
    pub entry: InboxEntry,
    pub message: Message,
    pub source_hardware_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeInboxRepoInput {
    pub device_id: i64,
    pub message_id: i64,
    pub acknowledged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgedInbox {
    pub entry: InboxEntry,
    pub message: Message,
}

/// Everything a delivery attempt needs, loaded in one round trip
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryContext {
    pub entry: InboxEntry,
    pub device: Device,
    pub message: Message,
    pub source_hardware_id: String,
}

/// A pending entry that startup recovery should reschedule
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverableDelivery {
    pub inbox_id: i64,
    pub message_type: MessageType,
}

/// Repository trait for inbox persistence operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait InboxRepository: Send + Sync {
    /// Atomically create a pending entry unless the pair already exists
    async fn create_entry_if_absent(
        &self,
        input: CreateInboxEntryRepoInput,
    ) -> DomainResult<CreateInboxEntryOutcome>;

    async fn list_pending(
        &self,
        input: ListPendingInboxRepoInput,
    ) -> DomainResult<Vec<PendingInboxItem>>;

    /// Transition to acknowledged and update message read tracking in one transaction.
    /// Returns None when the pair has no entry.
    async fn acknowledge(
        &self,
        input: AcknowledgeInboxRepoInput,
    ) -> DomainResult<Option<AcknowledgedInbox>>;

    async fn get_delivery_context(&self, inbox_id: i64) -> DomainResult<Option<DeliveryContext>>;

    /// pending -> delivered. None when the entry is no longer pending.
    async fn mark_delivered(
        &self,
        inbox_id: i64,
        delivered_at: DateTime<Utc>,
    ) -> DomainResult<Option<InboxEntry>>;

    /// Increment the attempt counter of a pending entry, moving it to failed
    /// once the counter reaches `retry_limit`. None when no longer pending.
    async fn record_failed_attempt(
        &self,
        inbox_id: i64,
        retry_limit: u32,
    ) -> DomainResult<Option<InboxEntry>>;

    /// Pending entries whose target has a webhook and attempts left
    async fn list_recoverable_deliveries(&self) -> DomainResult<Vec<RecoverableDelivery>>;
}
