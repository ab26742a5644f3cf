use common::domain::{
    Device, DeviceRepository, DomainError, DomainResult, Group, GroupRepository,
    ListGroupMembersRepoInput, Owner, OwnerRepository,
};
use common::geo::{km_to_meters, within_radius, GeoPoint};
use common::nid::NidMatcher;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A source device with the group and owner that shape its routing policy
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingSource {
    pub device: Device,
    pub group: Group,
    pub owner: Option<Owner>,
}

impl RoutingSource {
    /// Raw NID text for the NID predicate: message override, then device NID,
    /// then the group default.
    pub fn effective_nid(&self, nid_override: Option<&str>) -> Option<String> {
        nid_override
            .filter(|raw| !raw.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.device.nid.map(|nid| nid.to_decimal_string()))
            .or_else(|| self.group.effective_nid().map(|nid| nid.to_decimal_string()))
    }

    /// Owner radius overrides the group radius
    pub fn effective_radius_km(&self) -> Option<f64> {
        self.owner
            .as_ref()
            .and_then(|o| o.radius_km)
            .or(self.group.radius_km)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DistancePredicate {
    origin: GeoPoint,
    radius_meters: f64,
}

/// The predicates in play for one routing decision. Membership is enforced by
/// the repository query; NID and distance are only present when the group
/// policy uses them and they can be resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePolicy {
    nid: Option<NidMatcher>,
    distance: Option<DistancePredicate>,
}

impl CandidatePolicy {
    pub fn for_source(source: &RoutingSource, nid_override: Option<&str>) -> Self {
        let group_type = source.group.group_type;

        let nid = if group_type.uses_nid() {
            source
                .effective_nid(nid_override)
                .and_then(|raw| NidMatcher::from_raw(&raw))
        } else {
            None
        };

        let distance = match (group_type.uses_distance(), source.device.location) {
            (true, Some(origin)) => source.effective_radius_km().map(|km| DistancePredicate {
                origin,
                radius_meters: km_to_meters(km),
            }),
            _ => None,
        };

        Self { nid, distance }
    }

    pub fn filters_on_nid(&self) -> bool {
        self.nid.is_some()
    }

    pub fn filters_on_distance(&self) -> bool {
        self.distance.is_some()
    }

    pub fn admits(&self, candidate: &Device) -> bool {
        let nid_ok = self
            .nid
            .map_or(true, |matcher| matcher.admits(candidate.nid));

        let distance_ok = self.distance.map_or(true, |d| {
            candidate
                .location
                .is_some_and(|loc| within_radius(&d.origin, &loc, d.radius_meters))
        });

        nid_ok && distance_ok
    }
}

/// Persistence failures during routing surface as `RoutingUnavailable`
pub(crate) fn routing_unavailable(err: DomainError) -> DomainError {
    match err {
        DomainError::RepositoryError(e) => DomainError::RoutingUnavailable(format!("{:#}", e)),
        other => other,
    }
}

/// Selects the active devices eligible to receive a message from a source device
pub struct CandidateFilter {
    device_repository: Arc<dyn DeviceRepository>,
    group_repository: Arc<dyn GroupRepository>,
    owner_repository: Arc<dyn OwnerRepository>,
}

impl CandidateFilter {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        group_repository: Arc<dyn GroupRepository>,
        owner_repository: Arc<dyn OwnerRepository>,
    ) -> Self {
        Self {
            device_repository,
            group_repository,
            owner_repository,
        }
    }

    /// Load the group and owner of a source device
    pub async fn resolve_source(&self, device: Device) -> DomainResult<RoutingSource> {
        let group = self
            .group_repository
            .get_group(device.group_id)
            .await
            .map_err(routing_unavailable)?
            .ok_or_else(|| DomainError::GroupNotFound(device.group_id.to_string()))?;

        let owner = self
            .owner_repository
            .get_owner(device.owner_id)
            .await
            .map_err(routing_unavailable)?;

        Ok(RoutingSource {
            device,
            group,
            owner,
        })
    }

    /// Active group members other than the source that pass every predicate in play
    #[instrument(skip(self, source), fields(device_id = source.device.device_id, group_id = source.group.group_id))]
    pub async fn find_candidates(
        &self,
        source: &RoutingSource,
        nid_override: Option<&str>,
    ) -> DomainResult<Vec<Device>> {
        let policy = CandidatePolicy::for_source(source, nid_override);

        let members = self
            .device_repository
            .list_active_group_members(ListGroupMembersRepoInput {
                group_id: source.group.group_id,
                exclude_device_id: Some(source.device.device_id),
            })
            .await
            .map_err(routing_unavailable)?;

        let member_count = members.len();
        let candidates: Vec<Device> = members
            .into_iter()
            .filter(|d| d.active && d.device_id != source.device.device_id)
            .filter(|d| policy.admits(d))
            .collect();

        debug!(
            group_type = %source.group.group_type,
            nid_filter = policy.filters_on_nid(),
            distance_filter = policy.filters_on_distance(),
            members = member_count,
            candidates = candidates.len(),
            "candidate selection complete"
        );

        Ok(candidates)
    }
}
