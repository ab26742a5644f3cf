use common::domain::{CreateGroupInput, DomainResult, GroupRepository, GroupType};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Startup step that creates the canonical groups on an empty database
pub struct GroupSeeder {
    group_repository: Arc<dyn GroupRepository>,
}

impl GroupSeeder {
    pub fn new(group_repository: Arc<dyn GroupRepository>) -> Self {
        Self { group_repository }
    }

    /// Returns true when the groups were created by this call
    #[instrument(skip(self))]
    pub async fn ensure_default_groups(&self) -> DomainResult<bool> {
        let inputs = GroupType::ALL
            .iter()
            .copied()
            .map(CreateGroupInput::canonical)
            .collect();

        let seeded = self.group_repository.seed_groups_if_empty(inputs).await?;
        if seeded {
            info!(count = GroupType::ALL.len(), "seeded default groups");
        } else {
            debug!("groups already present, skipping seed");
        }
        Ok(seeded)
    }
}
