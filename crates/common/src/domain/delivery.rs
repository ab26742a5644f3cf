use crate::domain::message::MessageType;
use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Scheduling lane for a delivery attempt. Semantics are identical; only
/// queue order differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryPriority {
    Immediate,
    BestEffort,
}

impl From<MessageType> for DeliveryPriority {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Alarm => DeliveryPriority::Immediate,
            MessageType::Alert => DeliveryPriority::BestEffort,
        }
    }
}

/// One outstanding delivery attempt for an inbox entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryTask {
    pub inbox_id: i64,
    pub priority: DeliveryPriority,
    /// Consecutive non-transport failures for this entry
    pub internal_failures: u32,
}

impl DeliveryTask {
    pub fn new(inbox_id: i64, priority: DeliveryPriority) -> Self {
        Self {
            inbox_id,
            priority,
            internal_failures: 0,
        }
    }
}

/// Hands delivery tasks to whatever executes them
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeliveryScheduler: Send + Sync {
    async fn schedule(&self, task: DeliveryTask) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_from_message_type() {
        assert_eq!(
            DeliveryPriority::from(MessageType::Alarm),
            DeliveryPriority::Immediate
        );
        assert_eq!(
            DeliveryPriority::from(MessageType::Alert),
            DeliveryPriority::BestEffort
        );
    }
}
