use crate::domain::result::DomainResult;
use crate::nid::Nid;
use async_trait::async_trait;

/// Account holding devices; may override the group radius and default NID
#[derive(Debug, Clone, PartialEq)]
pub struct Owner {
    pub owner_id: i64,
    pub email: String,
    pub nid: Option<Nid>,
    pub radius_km: Option<f64>,
    pub active: bool,
}

/// Repository trait for owner lookups
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait OwnerRepository: Send + Sync {
    async fn get_owner(&self, owner_id: i64) -> DomainResult<Option<Owner>>;

    /// Fetch several owners at once; unknown IDs are skipped
    async fn get_owners(&self, owner_ids: Vec<i64>) -> DomainResult<Vec<Owner>>;
}
