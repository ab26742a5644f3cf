use crate::domain::{
    CandidateFilter, GroupSeeder, InboxService, MessageIngestionService, NetworkRangeService,
    RoutingService,
};
use common::domain::{
    DeliveryScheduler, DeviceRepository, GroupRepository, InboxRepository, MessageRepository,
    OwnerRepository,
};
use std::sync::Arc;

/// Repositories and the delivery hand-off the routing services are built from
#[derive(Clone)]
pub struct RoutingEngineDeps {
    pub device_repository: Arc<dyn DeviceRepository>,
    pub group_repository: Arc<dyn GroupRepository>,
    pub owner_repository: Arc<dyn OwnerRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub inbox_repository: Arc<dyn InboxRepository>,
    pub delivery_scheduler: Arc<dyn DeliveryScheduler>,
}

/// Entry point for everything a device can ask of the router
#[derive(Clone)]
pub struct RoutingEngine {
    pub ingestion: Arc<MessageIngestionService>,
    pub routing: Arc<RoutingService>,
    pub inbox: Arc<InboxService>,
    pub network_range: Arc<NetworkRangeService>,
    pub group_seeder: Arc<GroupSeeder>,
}

impl RoutingEngine {
    pub fn new(deps: RoutingEngineDeps) -> Self {
        let candidate_filter = Arc::new(CandidateFilter::new(
            deps.device_repository.clone(),
            deps.group_repository.clone(),
            deps.owner_repository.clone(),
        ));

        let routing = Arc::new(RoutingService::new(
            candidate_filter.clone(),
            deps.inbox_repository.clone(),
            deps.delivery_scheduler,
        ));

        let ingestion = Arc::new(MessageIngestionService::new(
            deps.device_repository.clone(),
            deps.message_repository,
            routing.clone(),
        ));

        let network_range = Arc::new(NetworkRangeService::new(
            candidate_filter,
            deps.device_repository,
            deps.owner_repository,
        ));

        Self {
            ingestion,
            routing,
            inbox: Arc::new(InboxService::new(deps.inbox_repository)),
            network_range,
            group_seeder: Arc::new(GroupSeeder::new(deps.group_repository)),
        }
    }
}
