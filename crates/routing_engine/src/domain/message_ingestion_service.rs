use crate::domain::routing_service::{RoutingOutcome, RoutingService};
use common::domain::{
    payload_nid, payload_position, payload_text, CreateMessageRepoInput, Device,
    DeviceRepository, DomainError, DomainResult, Message, MessageRepository, MessageSubType,
    MessageType, UpdateDeviceLocationRepoInput,
};
use common::nid::Nid;
use garde::Validate;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A message submitted by a device
#[derive(Debug, Clone, Validate)]
pub struct SubmitMessageInput {
    #[garde(custom(validate_message_type))]
    pub message_type: String,
    #[garde(custom(validate_payload))]
    pub payload: Value,
    #[garde(skip)]
    pub user: Option<String>,
}

fn validate_message_type(value: &str, _ctx: &()) -> garde::Result {
    value
        .parse::<MessageType>()
        .map(|_| ())
        .map_err(|_| garde::Error::new("must be 'alert' or 'alarm'"))
}

fn validate_payload(value: &Value, _ctx: &()) -> garde::Result {
    if !value.is_object() {
        return Err(garde::Error::new("must be a JSON object"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitMessageOutcome {
    pub message: Message,
    pub routing: RoutingOutcome,
}

impl SubmitMessageOutcome {
    pub fn target_hardware_ids(&self) -> Vec<String> {
        self.routing.target_hardware_ids()
    }
}

/// Persists device submissions and hands them to routing.
///
/// Flow:
/// 1. Validate input, including any embedded NID and position
/// 2. Load the active source device
/// 3. Derive the sub-type and persist the message
/// 4. Move the source device when the payload carries a new position
/// 5. Route
pub struct MessageIngestionService {
    device_repository: Arc<dyn DeviceRepository>,
    message_repository: Arc<dyn MessageRepository>,
    routing_service: Arc<RoutingService>,
}

impl MessageIngestionService {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        message_repository: Arc<dyn MessageRepository>,
        routing_service: Arc<RoutingService>,
    ) -> Self {
        Self {
            device_repository,
            message_repository,
            routing_service,
        }
    }

    /// Submit on behalf of a device identified by its hardware id
    pub async fn submit_by_hardware_id(
        &self,
        hardware_id: &str,
        input: SubmitMessageInput,
    ) -> DomainResult<SubmitMessageOutcome> {
        let device = self
            .device_repository
            .get_device_by_hardware_id(hardware_id)
            .await?
            .filter(|d| d.active)
            .ok_or_else(|| DomainError::DeviceNotFound(hardware_id.to_string()))?;

        self.submit_for_device(device, input).await
    }

    pub async fn submit(
        &self,
        source_device_id: i64,
        input: SubmitMessageInput,
    ) -> DomainResult<SubmitMessageOutcome> {
        let device = self
            .device_repository
            .get_device(source_device_id)
            .await?
            .filter(|d| d.active)
            .ok_or_else(|| DomainError::DeviceNotFound(source_device_id.to_string()))?;

        self.submit_for_device(device, input).await
    }

    #[instrument(skip(self, device, input), fields(device_id = device.device_id, hardware_id = %device.hardware_id))]
    async fn submit_for_device(
        &self,
        device: Device,
        input: SubmitMessageInput,
    ) -> DomainResult<SubmitMessageOutcome> {
        common::garde::validate_struct(&input)?;

        let message_type: MessageType = input.message_type.parse()?;
        if let Some(raw) = payload_nid(&input.payload) {
            Nid::parse(&raw)?;
        }
        let position = payload_position(&input.payload).transpose()?;

        let sub_type = MessageSubType::derive(message_type, &input.payload);
        let user = input
            .user
            .filter(|u| !u.trim().is_empty())
            .or_else(|| payload_text(&input.payload, &["user"]));

        let message = self
            .message_repository
            .create_message(CreateMessageRepoInput {
                message_type,
                sub_type,
                bcname: payload_text(&input.payload, &["bcname", "bc_name"]),
                recipient: payload_text(&input.payload, &["to"]),
                contact: payload_text(&input.payload, &["co"]),
                payload: input.payload,
                source_device_id: device.device_id,
                user,
            })
            .await?;

        debug!(message_id = message.message_id, "message persisted");

        let device = match position {
            Some(location) if device.location != Some(location) => {
                self.move_device(device, location).await
            }
            _ => device,
        };

        let routing = self
            .routing_service
            .route_message(&message, device)
            .await
            .map_err(|e| not_routed(message.message_id, e))?;

        info!(
            message_id = message.message_id,
            targets = routing.fan_out(),
            "message submitted"
        );

        Ok(SubmitMessageOutcome { message, routing })
    }

    /// Route an already stored message again, typically after a submission
    /// came back `RoutingUnavailable`. Targets that already have an entry
    /// are left untouched.
    #[instrument(skip(self))]
    pub async fn route_stored(&self, message_id: i64) -> DomainResult<SubmitMessageOutcome> {
        let message = self
            .message_repository
            .get_message(message_id)
            .await?
            .ok_or_else(|| DomainError::MessageNotFound(message_id.to_string()))?;

        let device = self
            .device_repository
            .get_device(message.source_device_id)
            .await?
            .filter(|d| d.active)
            .ok_or_else(|| DomainError::DeviceNotFound(message.source_device_id.to_string()))?;

        let routing = self
            .routing_service
            .route_message(&message, device)
            .await
            .map_err(|e| not_routed(message_id, e))?;

        info!(targets = routing.fan_out(), "stored message routed");
        Ok(SubmitMessageOutcome { message, routing })
    }

    /// A failed location update is logged and routing proceeds from the
    /// submitted position.
    async fn move_device(&self, mut device: Device, location: common::geo::GeoPoint) -> Device {
        match self
            .device_repository
            .update_device_location(UpdateDeviceLocationRepoInput {
                device_id: device.device_id,
                location,
            })
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                warn!(device_id = device.device_id, error = %e, "failed to update device location");
                device.location = Some(location);
                device
            }
        }
    }
}

fn not_routed(message_id: i64, err: DomainError) -> DomainError {
    match err {
        DomainError::RoutingUnavailable(reason) => DomainError::RoutingUnavailable(format!(
            "message {} stored but not routed: {}",
            message_id, reason
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate_filter::CandidateFilter;
    use crate::domain::test_support::*;
    use common::domain::{
        GroupType, MockDeliveryScheduler, MockDeviceRepository, MockGroupRepository,
        MockInboxRepository, MockMessageRepository, MockOwnerRepository,
    };
    use common::geo::GeoPoint;
    use serde_json::json;

    fn routing_from(members_repo: MockDeviceRepository) -> Arc<RoutingService> {
        let mut group_repo = MockGroupRepository::new();
        group_repo
            .expect_get_group()
            .returning(|id| Ok(Some(group(id, GroupType::Open))));
        let mut owner_repo = MockOwnerRepository::new();
        owner_repo.expect_get_owner().returning(|_| Ok(None));

        let filter = CandidateFilter::new(
            Arc::new(members_repo),
            Arc::new(group_repo),
            Arc::new(owner_repo),
        );
        Arc::new(RoutingService::new(
            Arc::new(filter),
            Arc::new(MockInboxRepository::new()),
            Arc::new(MockDeliveryScheduler::new()),
        ))
    }

    fn empty_group_routing() -> Arc<RoutingService> {
        let mut members = MockDeviceRepository::new();
        members
            .expect_list_active_group_members()
            .returning(|_| Ok(vec![]));
        routing_from(members)
    }

    fn input(message_type: &str, payload: Value) -> SubmitMessageInput {
        SubmitMessageInput {
            message_type: message_type.to_string(),
            payload,
            user: None,
        }
    }

    fn echo_message_repo() -> MockMessageRepository {
        let mut repo = MockMessageRepository::new();
        repo.expect_create_message().returning(|input| {
            let mut m = message(77, input.message_type, input.source_device_id, input.payload);
            m.alert_type = input.sub_type.alert_type;
            m.alarm_type = input.sub_type.alarm_type;
            m.user = input.user;
            m.bcname = input.bcname;
            m.recipient = input.recipient;
            m.contact = input.contact;
            Ok(m)
        });
        repo
    }

    #[tokio::test]
    async fn test_submit_persists_derived_fields() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .withf(|id| *id == 1)
            .return_once(|_| Ok(Some(device(1, 10))));

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(echo_message_repo()),
            empty_group_routing(),
        );

        let outcome = service
            .submit(
                1,
                input(
                    "alert",
                    json!({"type": "NS-PANIC", "user": "bob", "bc_name": "north", "to": "ops", "co": "hq"}),
                ),
            )
            .await
            .unwrap();

        let m = outcome.message;
        assert_eq!(m.message_id, 77);
        assert_eq!(m.alert_type.as_deref(), Some("ns_panic"));
        assert_eq!(m.user.as_deref(), Some("bob"));
        assert_eq!(m.bcname.as_deref(), Some("north"));
        assert_eq!(m.recipient.as_deref(), Some("ops"));
        assert_eq!(m.contact.as_deref(), Some("hq"));
        assert!(outcome.routing.entries.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_user_wins_over_payload_user() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .return_once(|_| Ok(Some(device(1, 10))));

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(echo_message_repo()),
            empty_group_routing(),
        );

        let mut submission = input("alarm", json!({"type": "PA", "user": "payload-user"}));
        submission.user = Some("caller".to_string());
        let outcome = service.submit(1, submission).await.unwrap();

        assert_eq!(outcome.message.user.as_deref(), Some("caller"));
        assert_eq!(outcome.message.alarm_type.as_deref(), Some("pa"));
    }

    #[tokio::test]
    async fn test_invalid_message_type_rejected_before_persisting() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .return_once(|_| Ok(Some(device(1, 10))));
        let mut message_repo = MockMessageRepository::new();
        message_repo.expect_create_message().times(0);

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(message_repo),
            empty_group_routing(),
        );

        let result = service.submit(1, input("notice", json!({}))).await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_non_object_payload_rejected() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .return_once(|_| Ok(Some(device(1, 10))));

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(MockMessageRepository::new()),
            empty_group_routing(),
        );

        let result = service.submit(1, input("alert", json!([1, 2]))).await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_payload_nid_rejected() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .return_once(|_| Ok(Some(device(1, 10))));

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(MockMessageRepository::new()),
            empty_group_routing(),
        );

        let result = service
            .submit(1, input("alert", json!({"nid": "0x100000000"})))
            .await;
        assert!(matches!(result, Err(DomainError::InvalidNid(_))));
    }

    #[tokio::test]
    async fn test_malformed_position_rejected() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .return_once(|_| Ok(Some(device(1, 10))));

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(MockMessageRepository::new()),
            empty_group_routing(),
        );

        let result = service
            .submit(
                1,
                input("alert", json!({"position": {"latitude": 95.0, "longitude": 0.0}})),
            )
            .await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_inactive_or_missing_device_not_found() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo.expect_get_device().return_once(|_| {
            let mut d = device(1, 10);
            d.active = false;
            Ok(Some(d))
        });

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(MockMessageRepository::new()),
            empty_group_routing(),
        );

        let result = service.submit(1, input("alert", json!({}))).await;
        assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_submit_by_hardware_id_resolves_device() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device_by_hardware_id()
            .withf(|hid| hid == "hw-001")
            .return_once(|_| Ok(Some(device(1, 10))));

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(echo_message_repo()),
            empty_group_routing(),
        );

        let outcome = service
            .submit_by_hardware_id("hw-001", input("alert", json!({})))
            .await
            .unwrap();
        assert_eq!(outcome.message.source_device_id, 1);
    }

    #[tokio::test]
    async fn test_new_position_updates_device_location() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .return_once(|_| Ok(Some(at(device(1, 10), 0.0, 0.0))));
        device_repo
            .expect_update_device_location()
            .withf(|input| {
                input.device_id == 1
                    && input.location == GeoPoint::new(1.5, 2.5).unwrap()
            })
            .times(1)
            .return_once(|input| {
                Ok(at(
                    device(1, 10),
                    input.location.latitude(),
                    input.location.longitude(),
                ))
            });

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(echo_message_repo()),
            empty_group_routing(),
        );

        service
            .submit(
                1,
                input("alert", json!({"position": {"latitude": 1.5, "longitude": 2.5}})),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unchanged_position_skips_update() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .return_once(|_| Ok(Some(at(device(1, 10), 1.5, 2.5))));
        device_repo.expect_update_device_location().times(0);

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(echo_message_repo()),
            empty_group_routing(),
        );

        service
            .submit(
                1,
                input("alert", json!({"position": {"latitude": 1.5, "longitude": 2.5}})),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_routing_failure_reports_stored_message_id() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .return_once(|_| Ok(Some(device(1, 10))));

        let mut members = MockDeviceRepository::new();
        members
            .expect_list_active_group_members()
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("timeout"))));

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(echo_message_repo()),
            routing_from(members),
        );

        match service.submit(1, input("alert", json!({}))).await {
            Err(DomainError::RoutingUnavailable(reason)) => assert!(reason.contains("77")),
            other => panic!("expected RoutingUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_route_stored_unknown_message_is_message_not_found() {
        let mut message_repo = MockMessageRepository::new();
        message_repo.expect_get_message().return_once(|_| Ok(None));

        let service = MessageIngestionService::new(
            Arc::new(MockDeviceRepository::new()),
            Arc::new(message_repo),
            empty_group_routing(),
        );

        let result = service.route_stored(404).await;
        assert!(matches!(result, Err(DomainError::MessageNotFound(_))));
    }

    #[tokio::test]
    async fn test_route_stored_routes_from_the_source_device() {
        let mut message_repo = MockMessageRepository::new();
        message_repo
            .expect_get_message()
            .withf(|id| *id == 77)
            .return_once(|_| Ok(Some(message(77, MessageType::Alarm, 1, json!({"type": "PA"})))));

        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device()
            .withf(|id| *id == 1)
            .return_once(|_| Ok(Some(device(1, 10))));

        let service = MessageIngestionService::new(
            Arc::new(device_repo),
            Arc::new(message_repo),
            empty_group_routing(),
        );

        let outcome = service.route_stored(77).await.unwrap();
        assert_eq!(outcome.message.message_id, 77);
        assert_eq!(outcome.routing.fan_out(), 0);
    }
}
