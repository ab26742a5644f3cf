use crate::domain::result::{DomainError, DomainResult};
use crate::nid::Nid;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Routing policy bucket. The type alone decides which filters apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    Private,
    Exclusive,
    Open,
    DataLogging,
    Enhanced,
    Location,
}

impl GroupType {
    pub const ALL: [GroupType; 6] = [
        GroupType::Private,
        GroupType::Exclusive,
        GroupType::Open,
        GroupType::DataLogging,
        GroupType::Enhanced,
        GroupType::Location,
    ];

    pub fn uses_nid(self) -> bool {
        matches!(
            self,
            GroupType::Private
                | GroupType::Exclusive
                | GroupType::DataLogging
                | GroupType::Enhanced
                | GroupType::Location
        )
    }

    pub fn uses_distance(self) -> bool {
        matches!(
            self,
            GroupType::Open | GroupType::Enhanced | GroupType::Location
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupType::Private => "private",
            GroupType::Exclusive => "exclusive",
            GroupType::Open => "open",
            GroupType::DataLogging => "data_logging",
            GroupType::Enhanced => "enhanced",
            GroupType::Location => "location",
        }
    }

    pub fn default_description(self) -> &'static str {
        match self {
            GroupType::Private => "Private group: NID matching only",
            GroupType::Exclusive => "Exclusive group: NID matching only",
            GroupType::Open => "Open group: distance matching only",
            GroupType::DataLogging => "Data logging group: NID matching only",
            GroupType::Enhanced => "Enhanced group: NID and distance matching",
            GroupType::Location => "Location group: broadcast NID and distance matching",
        }
    }

    /// NID a freshly seeded group of this type carries
    pub fn default_nid(self) -> Option<Nid> {
        match self {
            GroupType::Location => Some(Nid::BROADCAST),
            _ => None,
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::InvalidGroupType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub group_id: i64,
    pub group_type: GroupType,
    pub nid: Option<Nid>,
    pub radius_km: Option<f64>,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Group {
    /// The NID this group contributes when neither message nor device carries one.
    /// Location groups always default to the broadcast sentinel.
    pub fn effective_nid(&self) -> Option<Nid> {
        match self.group_type {
            GroupType::Location => Some(Nid::BROADCAST),
            _ => self.nid,
        }
    }
}

/// Input for seeding one group
#[derive(Debug, Clone, PartialEq)]
pub struct CreateGroupInput {
    pub group_type: GroupType,
    pub nid: Option<Nid>,
    pub radius_km: Option<f64>,
    pub description: String,
}

impl CreateGroupInput {
    pub fn canonical(group_type: GroupType) -> Self {
        Self {
            group_type,
            nid: group_type.default_nid(),
            radius_km: None,
            description: group_type.default_description().to_string(),
        }
    }
}

/// Repository trait for group persistence operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Get a group by ID
    async fn get_group(&self, group_id: i64) -> DomainResult<Option<Group>>;

    /// Insert all inputs in one transaction when the table is empty.
    /// Returns true when rows were inserted.
    async fn seed_groups_if_empty(&self, inputs: Vec<CreateGroupInput>) -> DomainResult<bool>;
}

/// Reject negative or non-finite radii at the input boundary
pub fn validate_radius_km(radius_km: f64) -> DomainResult<f64> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(DomainError::InvalidRadius(format!(
            "radius must be a finite, non-negative number of kilometers (got {})",
            radius_km
        )));
    }
    Ok(radius_km)
}
