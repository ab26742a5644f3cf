use crate::domain::candidate_filter::{routing_unavailable, CandidateFilter, RoutingSource};
use common::domain::{
    CreateInboxEntryRepoInput, DeliveryPriority, DeliveryScheduler, DeliveryTask, Device,
    DomainResult, InboxEntry, InboxRepository, Message,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One target of a routed message
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedEntry {
    pub entry: InboxEntry,
    pub target: Device,
    /// False when the entry already existed from an earlier routing call
    pub created: bool,
    /// True when a delivery attempt was handed to the scheduler
    pub scheduled: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingOutcome {
    pub entries: Vec<RoutedEntry>,
}

impl RoutingOutcome {
    /// Entries created by this call
    pub fn created_entries(&self) -> Vec<&InboxEntry> {
        self.entries
            .iter()
            .filter(|e| e.created)
            .map(|e| &e.entry)
            .collect()
    }

    pub fn target_hardware_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.target.hardware_id.clone())
            .collect()
    }

    pub fn fan_out(&self) -> usize {
        self.entries.len()
    }
}

/// Turns a message and its source device into persisted inbox entries plus
/// scheduled webhook deliveries.
pub struct RoutingService {
    candidate_filter: Arc<CandidateFilter>,
    inbox_repository: Arc<dyn InboxRepository>,
    delivery_scheduler: Arc<dyn DeliveryScheduler>,
}

impl RoutingService {
    pub fn new(
        candidate_filter: Arc<CandidateFilter>,
        inbox_repository: Arc<dyn InboxRepository>,
        delivery_scheduler: Arc<dyn DeliveryScheduler>,
    ) -> Self {
        Self {
            candidate_filter,
            inbox_repository,
            delivery_scheduler,
        }
    }

    /// Route a message. Safe to call again for the same message: existing
    /// (device, message) entries are left untouched and not rescheduled.
    #[instrument(skip(self, message, source_device), fields(message_id = message.message_id, device_id = source_device.device_id))]
    pub async fn route_message(
        &self,
        message: &Message,
        source_device: Device,
    ) -> DomainResult<RoutingOutcome> {
        let source = self.candidate_filter.resolve_source(source_device).await?;
        self.route_from_source(message, &source).await
    }

    /// Entries are created and scheduled one target at a time. A persistence
    /// failure partway through returns `RoutingUnavailable` with the earlier
    /// targets already created and scheduled; calling again completes the
    /// fan-out without touching them.
    pub async fn route_from_source(
        &self,
        message: &Message,
        source: &RoutingSource,
    ) -> DomainResult<RoutingOutcome> {
        let nid_override = message.nid_override();
        let targets = self
            .candidate_filter
            .find_candidates(source, nid_override.as_deref())
            .await?;

        let priority = DeliveryPriority::from(message.message_type);
        let mut entries = Vec::with_capacity(targets.len());

        for target in targets {
            let outcome = self
                .inbox_repository
                .create_entry_if_absent(CreateInboxEntryRepoInput {
                    device_id: target.device_id,
                    message_id: message.message_id,
                })
                .await
                .map_err(routing_unavailable)?;

            let scheduled = outcome.created
                && target.has_webhook()
                && self.schedule(outcome.entry.inbox_id, priority).await;

            entries.push(RoutedEntry {
                entry: outcome.entry,
                target,
                created: outcome.created,
                scheduled,
            });
        }

        let routed = RoutingOutcome { entries };
        info!(
            targets = routed.fan_out(),
            created = routed.created_entries().len(),
            message_type = %message.message_type,
            "message routed"
        );
        Ok(routed)
    }

    /// Never waits for queue room. A refused hand-off leaves the entry
    /// pending for pull retrieval and the recovery sweep; it never fails
    /// routing.
    async fn schedule(&self, inbox_id: i64, priority: DeliveryPriority) -> bool {
        match self
            .delivery_scheduler
            .schedule(DeliveryTask::new(inbox_id, priority))
            .await
        {
            Ok(()) => {
                debug!(inbox_id, ?priority, "delivery scheduled");
                true
            }
            Err(e) => {
                warn!(inbox_id, error = %e, "failed to schedule delivery");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::*;
    use common::domain::{
        CreateInboxEntryOutcome, DomainError, GroupType, MessageType, MockDeliveryScheduler,
        MockDeviceRepository, MockGroupRepository, MockInboxRepository, MockOwnerRepository,
    };
    use serde_json::json;

    fn candidate_filter(members: Vec<Device>, group_type: GroupType) -> Arc<CandidateFilter> {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_list_active_group_members()
            .returning(move |_| Ok(members.clone()));

        let mut group_repo = MockGroupRepository::new();
        group_repo
            .expect_get_group()
            .returning(move |id| Ok(Some(group(id, group_type))));

        let mut owner_repo = MockOwnerRepository::new();
        owner_repo.expect_get_owner().returning(|id| Ok(Some(owner(id))));

        Arc::new(CandidateFilter::new(
            Arc::new(device_repo),
            Arc::new(group_repo),
            Arc::new(owner_repo),
        ))
    }

    #[tokio::test]
    async fn test_route_creates_entries_and_schedules_webhook_targets() {
        let source = with_nid(device(1, 10), "42");
        let hooked = with_webhook(with_nid(device(2, 10), "42"));
        let pull_only = with_nid(device(3, 10), "42");

        let mut inbox_repo = MockInboxRepository::new();
        inbox_repo
            .expect_create_entry_if_absent()
            .times(2)
            .returning(|input| {
                Ok(CreateInboxEntryOutcome {
                    entry: inbox_entry(100 + input.device_id, input.device_id, input.message_id),
                    created: true,
                })
            });

        let mut scheduler = MockDeliveryScheduler::new();
        scheduler
            .expect_schedule()
            .withf(|task| task.inbox_id == 102 && task.priority == DeliveryPriority::Immediate)
            .times(1)
            .returning(|_| Ok(()));

        let service = RoutingService::new(
            candidate_filter(vec![hooked, pull_only], GroupType::Private),
            Arc::new(inbox_repo),
            Arc::new(scheduler),
        );

        let msg = message(7, MessageType::Alarm, 1, json!({}));
        let outcome = service.route_message(&msg, source).await.unwrap();

        assert_eq!(outcome.fan_out(), 2);
        assert_eq!(outcome.created_entries().len(), 2);
        assert_eq!(outcome.target_hardware_ids(), vec!["hw-002", "hw-003"]);
        assert!(outcome.entries[0].scheduled);
        assert!(!outcome.entries[1].scheduled);
    }

    #[tokio::test]
    async fn test_alerts_are_best_effort() {
        let mut inbox_repo = MockInboxRepository::new();
        inbox_repo.expect_create_entry_if_absent().returning(|input| {
            Ok(CreateInboxEntryOutcome {
                entry: inbox_entry(1, input.device_id, input.message_id),
                created: true,
            })
        });

        let mut scheduler = MockDeliveryScheduler::new();
        scheduler
            .expect_schedule()
            .withf(|task| task.priority == DeliveryPriority::BestEffort)
            .times(1)
            .returning(|_| Ok(()));

        let service = RoutingService::new(
            candidate_filter(vec![with_webhook(device(2, 10))], GroupType::Open),
            Arc::new(inbox_repo),
            Arc::new(scheduler),
        );

        service
            .route_message(&alert(1, 1), device(1, 10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rerouting_does_not_reschedule_existing_entries() {
        let mut inbox_repo = MockInboxRepository::new();
        inbox_repo
            .expect_create_entry_if_absent()
            .times(1)
            .returning(|input| {
                Ok(CreateInboxEntryOutcome {
                    entry: inbox_entry(55, input.device_id, input.message_id),
                    created: false,
                })
            });

        let mut scheduler = MockDeliveryScheduler::new();
        scheduler.expect_schedule().times(0);

        let service = RoutingService::new(
            candidate_filter(vec![with_webhook(device(2, 10))], GroupType::Open),
            Arc::new(inbox_repo),
            Arc::new(scheduler),
        );

        let outcome = service
            .route_message(&alert(1, 1), device(1, 10))
            .await
            .unwrap();

        assert_eq!(outcome.fan_out(), 1);
        assert!(outcome.created_entries().is_empty());
        assert_eq!(outcome.entries[0].entry.inbox_id, 55);
    }

    #[tokio::test]
    async fn test_scheduler_failure_does_not_fail_routing() {
        let mut inbox_repo = MockInboxRepository::new();
        inbox_repo.expect_create_entry_if_absent().returning(|input| {
            Ok(CreateInboxEntryOutcome {
                entry: inbox_entry(9, input.device_id, input.message_id),
                created: true,
            })
        });

        let mut scheduler = MockDeliveryScheduler::new();
        scheduler
            .expect_schedule()
            .times(1)
            .returning(|_| Err(DomainError::QueueUnavailable("closed".to_string())));

        let service = RoutingService::new(
            candidate_filter(vec![with_webhook(device(2, 10))], GroupType::Open),
            Arc::new(inbox_repo),
            Arc::new(scheduler),
        );

        let outcome = service
            .route_message(&alert(1, 1), device(1, 10))
            .await
            .unwrap();

        assert_eq!(outcome.created_entries().len(), 1);
        assert!(!outcome.entries[0].scheduled);
    }

    #[tokio::test]
    async fn test_zero_targets_is_success() {
        let service = RoutingService::new(
            candidate_filter(vec![], GroupType::Private),
            Arc::new(MockInboxRepository::new()),
            Arc::new(MockDeliveryScheduler::new()),
        );

        let outcome = service
            .route_message(&alert(1, 1), device(1, 10))
            .await
            .unwrap();

        assert_eq!(outcome.fan_out(), 0);
    }

    #[tokio::test]
    async fn test_inbox_failure_is_routing_unavailable() {
        let mut inbox_repo = MockInboxRepository::new();
        inbox_repo
            .expect_create_entry_if_absent()
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("pool exhausted"))));

        let service = RoutingService::new(
            candidate_filter(vec![device(2, 10)], GroupType::Open),
            Arc::new(inbox_repo),
            Arc::new(MockDeliveryScheduler::new()),
        );

        let result = service.route_message(&alert(1, 1), device(1, 10)).await;
        assert!(matches!(result, Err(DomainError::RoutingUnavailable(_))));
    }

    #[tokio::test]
    async fn test_partial_fan_out_completes_on_second_call() {
        let mut inbox_repo = MockInboxRepository::new();
        let seen = std::sync::Mutex::new(std::collections::HashSet::new());
        let mut device_3_failures = 1;
        inbox_repo.expect_create_entry_if_absent().returning(move |input| {
            if input.device_id == 3 && device_3_failures > 0 {
                device_3_failures -= 1;
                return Err(DomainError::RepositoryError(anyhow::anyhow!("connection reset")));
            }
            let created = seen.lock().unwrap().insert(input.device_id);
            Ok(CreateInboxEntryOutcome {
                entry: inbox_entry(100 + input.device_id, input.device_id, input.message_id),
                created,
            })
        });

        let mut scheduler = MockDeliveryScheduler::new();
        scheduler
            .expect_schedule()
            .withf(|task| task.inbox_id == 102)
            .times(1)
            .returning(|_| Ok(()));
        scheduler
            .expect_schedule()
            .withf(|task| task.inbox_id == 103)
            .times(1)
            .returning(|_| Ok(()));

        let service = RoutingService::new(
            candidate_filter(
                vec![with_webhook(device(2, 10)), with_webhook(device(3, 10))],
                GroupType::Open,
            ),
            Arc::new(inbox_repo),
            Arc::new(scheduler),
        );

        let first = service.route_message(&alert(1, 1), device(1, 10)).await;
        assert!(matches!(first, Err(DomainError::RoutingUnavailable(_))));

        let second = service
            .route_message(&alert(1, 1), device(1, 10))
            .await
            .unwrap();
        assert_eq!(second.fan_out(), 2);
        assert_eq!(second.created_entries().len(), 1);
        assert_eq!(second.created_entries()[0].device_id, 3);
    }

    #[tokio::test]
    async fn test_payload_nid_override_is_applied() {
        let source = with_nid(device(1, 10), "1");
        let b = with_nid(device(2, 10), "1");
        let c = with_nid(device(3, 10), "0x10");

        let mut inbox_repo = MockInboxRepository::new();
        inbox_repo
            .expect_create_entry_if_absent()
            .withf(|input| input.device_id == 3)
            .times(1)
            .returning(|input| {
                Ok(CreateInboxEntryOutcome {
                    entry: inbox_entry(1, input.device_id, input.message_id),
                    created: true,
                })
            });

        let service = RoutingService::new(
            candidate_filter(vec![b, c], GroupType::Private),
            Arc::new(inbox_repo),
            Arc::new(MockDeliveryScheduler::new()),
        );

        let msg = message(1, MessageType::Alert, 1, json!({"nid": "16"}));
        let outcome = service.route_message(&msg, source).await.unwrap();
        assert_eq!(outcome.target_hardware_ids(), vec!["hw-003"]);
    }
}
