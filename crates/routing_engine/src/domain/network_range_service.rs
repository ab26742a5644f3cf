use crate::domain::candidate_filter::CandidateFilter;
use common::domain::{Device, DeviceRepository, DomainError, DomainResult, Owner, OwnerRepository};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Read-only discovery of which devices and owners a device can reach.
/// Uses the same candidate predicates as routing, minus message overrides.
pub struct NetworkRangeService {
    candidate_filter: Arc<CandidateFilter>,
    device_repository: Arc<dyn DeviceRepository>,
    owner_repository: Arc<dyn OwnerRepository>,
}

impl NetworkRangeService {
    pub fn new(
        candidate_filter: Arc<CandidateFilter>,
        device_repository: Arc<dyn DeviceRepository>,
        owner_repository: Arc<dyn OwnerRepository>,
    ) -> Self {
        Self {
            candidate_filter,
            device_repository,
            owner_repository,
        }
    }

    #[instrument(skip(self))]
    pub async fn devices_in_range(&self, device_id: i64) -> DomainResult<Vec<Device>> {
        let device = self
            .device_repository
            .get_device(device_id)
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))?;

        self.reachable_from(device).await
    }

    #[instrument(skip(self))]
    pub async fn devices_in_range_by_hardware_id(
        &self,
        hardware_id: &str,
    ) -> DomainResult<Vec<Device>> {
        let device = self
            .device_repository
            .get_device_by_hardware_id(hardware_id)
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(hardware_id.to_string()))?;

        self.reachable_from(device).await
    }

    /// Distinct owners of every device reachable from any of the owner's
    /// active devices. The owner itself is included when one of its other
    /// devices is reachable.
    #[instrument(skip(self))]
    pub async fn owners_in_range(&self, owner_id: i64) -> DomainResult<Vec<Owner>> {
        if self.owner_repository.get_owner(owner_id).await?.is_none() {
            debug!("unknown owner");
            return Ok(vec![]);
        }

        let devices = self
            .device_repository
            .list_active_devices_by_owner(owner_id)
            .await?;

        let mut owner_ids = BTreeSet::new();
        for device in devices {
            for reachable in self.reachable_from(device).await? {
                owner_ids.insert(reachable.owner_id);
            }
        }

        if owner_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut owners = self
            .owner_repository
            .get_owners(owner_ids.into_iter().collect())
            .await?;
        owners.sort_by_key(|o| o.owner_id);

        debug!(count = owners.len(), "owners in range");
        Ok(owners)
    }

    async fn reachable_from(&self, device: Device) -> DomainResult<Vec<Device>> {
        let source = self.candidate_filter.resolve_source(device).await?;
        self.candidate_filter.find_candidates(&source, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::*;
    use common::domain::{GroupType, MockDeviceRepository, MockGroupRepository, MockOwnerRepository};

    fn owned_by(mut device: Device, owner_id: i64) -> Device {
        device.owner_id = owner_id;
        device
    }

    fn service(
        lookup_repo: MockDeviceRepository,
        members_repo: MockDeviceRepository,
        owner_repo: MockOwnerRepository,
        group_type: GroupType,
    ) -> NetworkRangeService {
        let mut group_repo = MockGroupRepository::new();
        group_repo
            .expect_get_group()
            .returning(move |id| Ok(Some(group(id, group_type))));

        let owner_repo = Arc::new(owner_repo);
        let filter = CandidateFilter::new(
            Arc::new(members_repo),
            Arc::new(group_repo),
            owner_repo.clone(),
        );
        NetworkRangeService::new(Arc::new(filter), Arc::new(lookup_repo), owner_repo)
    }

    #[tokio::test]
    async fn test_devices_in_range_applies_group_predicates() {
        let mut lookup = MockDeviceRepository::new();
        lookup
            .expect_get_device()
            .withf(|id| *id == 1)
            .return_once(|_| Ok(Some(with_nid(device(1, 10), "0x2A"))));

        let mut members = MockDeviceRepository::new();
        members
            .expect_list_active_group_members()
            .withf(|input| input.group_id == 10 && input.exclude_device_id == Some(1))
            .return_once(|_| {
                Ok(vec![
                    with_nid(device(2, 10), "42"),
                    with_nid(device(3, 10), "43"),
                ])
            });

        let mut owners = MockOwnerRepository::new();
        owners.expect_get_owner().returning(|id| Ok(Some(owner(id))));

        let svc = service(lookup, members, owners, GroupType::Private);
        let found = svc.devices_in_range(1).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].hardware_id, "hw-002");
    }

    #[tokio::test]
    async fn test_devices_in_range_unknown_device() {
        let mut lookup = MockDeviceRepository::new();
        lookup.expect_get_device().return_once(|_| Ok(None));

        let svc = service(
            lookup,
            MockDeviceRepository::new(),
            MockOwnerRepository::new(),
            GroupType::Open,
        );

        let result = svc.devices_in_range(99).await;
        assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_devices_in_range_by_hardware_id() {
        let mut lookup = MockDeviceRepository::new();
        lookup
            .expect_get_device_by_hardware_id()
            .withf(|hid| hid == "hw-001")
            .return_once(|_| Ok(Some(device(1, 10))));

        let mut members = MockDeviceRepository::new();
        members
            .expect_list_active_group_members()
            .return_once(|_| Ok(vec![device(2, 10)]));

        let mut owners = MockOwnerRepository::new();
        owners.expect_get_owner().returning(|_| Ok(None));

        let svc = service(lookup, members, owners, GroupType::Open);
        let found = svc.devices_in_range_by_hardware_id("hw-001").await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_owners_in_range_unknown_owner_is_empty() {
        let mut owners = MockOwnerRepository::new();
        owners.expect_get_owner().return_once(|_| Ok(None));

        let mut lookup = MockDeviceRepository::new();
        lookup.expect_list_active_devices_by_owner().times(0);

        let svc = service(lookup, MockDeviceRepository::new(), owners, GroupType::Open);
        assert!(svc.owners_in_range(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_owners_in_range_collects_distinct_owners() {
        let mut lookup = MockDeviceRepository::new();
        lookup
            .expect_list_active_devices_by_owner()
            .withf(|id| *id == 1)
            .return_once(|_| Ok(vec![device(1, 10), device(4, 20)]));

        let mut members = MockDeviceRepository::new();
        members
            .expect_list_active_group_members()
            .returning(|input| match input.group_id {
                10 => Ok(vec![owned_by(device(2, 10), 7), owned_by(device(3, 10), 8)]),
                _ => Ok(vec![owned_by(device(5, 20), 7)]),
            });

        let mut owners = MockOwnerRepository::new();
        owners.expect_get_owner().returning(|id| Ok(Some(owner(id))));
        owners
            .expect_get_owners()
            .withf(|ids| ids == &vec![7, 8])
            .times(1)
            .return_once(|ids| Ok(ids.into_iter().rev().map(owner).collect()));

        let svc = service(lookup, members, owners, GroupType::Open);
        let found = svc.owners_in_range(1).await.unwrap();

        let ids: Vec<i64> = found.iter().map(|o| o.owner_id).collect();
        assert_eq!(ids, vec![7, 8]);
    }

    #[tokio::test]
    async fn test_owners_in_range_nothing_reachable() {
        let mut lookup = MockDeviceRepository::new();
        lookup
            .expect_list_active_devices_by_owner()
            .return_once(|_| Ok(vec![device(1, 10)]));

        let mut members = MockDeviceRepository::new();
        members
            .expect_list_active_group_members()
            .return_once(|_| Ok(vec![]));

        let mut owners = MockOwnerRepository::new();
        owners.expect_get_owner().returning(|id| Ok(Some(owner(id))));
        owners.expect_get_owners().times(0);

        let svc = service(lookup, members, owners, GroupType::Open);
        assert!(svc.owners_in_range(1).await.unwrap().is_empty());
    }
}
