use crate::domain::{
    validate_radius_km, CreateGroupInput, DomainError, DomainResult, Group, GroupRepository,
};
use crate::nid::Nid;
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, info};

/// Group row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct GroupRow {
    pub group_id: i64,
    pub group_type: String,
    pub nid: Option<i64>,
    pub radius_km: Option<f64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for GroupRow {
    fn from(row: &Row) -> Self {
        Self {
            group_id: row.get(0),
            group_type: row.get(1),
            nid: row.get(2),
            radius_km: row.get(3),
            description: row.get(4),
            created_at: row.get(5),
        }
    }
}

impl TryFrom<GroupRow> for Group {
    type Error = DomainError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Group {
            group_id: row.group_id,
            group_type: row.group_type.parse()?,
            nid: row.nid.map(Nid::from_i64).transpose()?,
            radius_km: row.radius_km.map(validate_radius_km).transpose()?,
            description: row.description,
            created_at: Some(row.created_at),
        })
    }
}

#[derive(Clone)]
pub struct PostgresGroupRepository {
    client: PostgresClient,
}

impl PostgresGroupRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GroupRepository for PostgresGroupRepository {
    async fn get_group(&self, group_id: i64) -> DomainResult<Option<Group>> {
        debug!(group_id, "getting group from database");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT group_id, group_type, nid, radius_km, description, created_at
                 FROM groups
                 WHERE group_id = $1",
                &[&group_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.map(|row| Group::try_from(GroupRow::from(&row)))
            .transpose()
    }

    async fn seed_groups_if_empty(&self, inputs: Vec<CreateGroupInput>) -> DomainResult<bool> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        // Serialize concurrent seeders so only one sees an empty table
        tx.execute("LOCK TABLE groups IN SHARE ROW EXCLUSIVE MODE", &[])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let existing: i64 = tx
            .query_one("SELECT COUNT(*) FROM groups", &[])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .get(0);

        if existing > 0 {
            debug!(existing, "groups already present, skipping seed");
            return Ok(false);
        }

        let now = Utc::now();
        for input in &inputs {
            let nid = input.nid.map(Nid::to_i64);
            tx.execute(
                "INSERT INTO groups (group_type, nid, radius_km, description, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &input.group_type.as_str(),
                    &nid,
                    &input.radius_km,
                    &input.description,
                    &now,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        info!(count = inputs.len(), "seeded default groups");
        Ok(true)
    }
}
