use chrono::Utc;
use common::domain::{
    AcknowledgeInboxRepoInput, AcknowledgedInbox, DomainError, DomainResult, InboxRepository,
    ListPendingInboxRepoInput, PendingInboxItem,
};
use common::nid::Nid;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Filters for a device's pending inbox. NID and hardware id refer to the
/// device that sent the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPendingInboxInput {
    pub device_id: i64,
    pub user: Option<String>,
    pub nid: Option<String>,
    pub hardware_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgeMessageInput {
    pub device_id: i64,
    pub message_id: i64,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Device-facing inbox reads and the acknowledge transition
pub struct InboxService {
    inbox_repository: Arc<dyn InboxRepository>,
}

impl InboxService {
    pub fn new(inbox_repository: Arc<dyn InboxRepository>) -> Self {
        Self { inbox_repository }
    }

    #[instrument(skip(self, input), fields(device_id = input.device_id))]
    pub async fn list_pending(
        &self,
        input: ListPendingInboxInput,
    ) -> DomainResult<Vec<PendingInboxItem>> {
        let source_nid = Nid::parse_optional(input.nid.as_deref())?;

        let items = self
            .inbox_repository
            .list_pending(ListPendingInboxRepoInput {
                device_id: input.device_id,
                user: non_blank(input.user),
                source_nid,
                source_hardware_id: non_blank(input.hardware_id),
            })
            .await?;

        debug!(count = items.len(), "listed pending inbox");
        Ok(items)
    }

    /// Mark the (device, message) entry acknowledged and record the read on the
    /// message. Re-acknowledging is not an error and keeps the first timestamp.
    #[instrument(skip(self), fields(device_id = input.device_id, message_id = input.message_id))]
    pub async fn acknowledge(&self, input: AcknowledgeMessageInput) -> DomainResult<AcknowledgedInbox> {
        let acknowledged = self
            .inbox_repository
            .acknowledge(AcknowledgeInboxRepoInput {
                device_id: input.device_id,
                message_id: input.message_id,
                acknowledged_at: Utc::now(),
            })
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!(
                    "no inbox entry for device {} and message {}",
                    input.device_id, input.message_id
                ))
            })?;

        info!(inbox_id = acknowledged.entry.inbox_id, "message acknowledged");
        Ok(acknowledged)
    }
}
