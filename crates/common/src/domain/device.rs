use crate::domain::result::DomainResult;
use crate::geo::GeoPoint;
use crate::nid::Nid;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Routing participant registered under an owner and a group
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub device_id: i64,
    pub hardware_id: String,
    pub owner_id: i64,
    pub group_id: i64,
    pub nid: Option<Nid>,
    pub location: Option<GeoPoint>,
    pub webhook_url: Option<String>,
    pub retry_limit: u32,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Device {
    pub fn has_webhook(&self) -> bool {
        self.webhook_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

/// Input for listing the active members of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListGroupMembersRepoInput {
    pub group_id: i64,
    pub exclude_device_id: Option<i64>,
}

/// Input for moving a device to a new location
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDeviceLocationRepoInput {
    pub device_id: i64,
    pub location: GeoPoint,
}

/// Repository trait for device persistence operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn get_device(&self, device_id: i64) -> DomainResult<Option<Device>>;

    async fn get_device_by_hardware_id(&self, hardware_id: &str) -> DomainResult<Option<Device>>;

    /// Active devices of a group, optionally excluding one device
    async fn list_active_group_members(
        &self,
        input: ListGroupMembersRepoInput,
    ) -> DomainResult<Vec<Device>>;

    async fn list_active_devices_by_owner(&self, owner_id: i64) -> DomainResult<Vec<Device>>;

    async fn update_device_location(
        &self,
        input: UpdateDeviceLocationRepoInput,
    ) -> DomainResult<Device>;
}
