use crate::domain::{validate_radius_km, DomainError, DomainResult, Owner, OwnerRepository};
use crate::nid::Nid;
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::debug;

/// Owner row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct OwnerRow {
    pub owner_id: i64,
    pub email: String,
    pub nid: Option<i64>,
    pub radius_km: Option<f64>,
    pub active: bool,
}

impl From<&Row> for OwnerRow {
    fn from(row: &Row) -> Self {
        Self {
            owner_id: row.get(0),
            email: row.get(1),
            nid: row.get(2),
            radius_km: row.get(3),
            active: row.get(4),
        }
    }
}

impl TryFrom<OwnerRow> for Owner {
    type Error = DomainError;

    fn try_from(row: OwnerRow) -> Result<Self, Self::Error> {
        Ok(Owner {
            owner_id: row.owner_id,
            email: row.email,
            nid: row.nid.map(Nid::from_i64).transpose()?,
            radius_km: row.radius_km.map(validate_radius_km).transpose()?,
            active: row.active,
        })
    }
}

#[derive(Clone)]
pub struct PostgresOwnerRepository {
    client: PostgresClient,
}

impl PostgresOwnerRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OwnerRepository for PostgresOwnerRepository {
    async fn get_owner(&self, owner_id: i64) -> DomainResult<Option<Owner>> {
        debug!(owner_id, "getting owner from database");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT owner_id, email, nid, radius_km, active FROM owners WHERE owner_id = $1",
                &[&owner_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.map(|row| Owner::try_from(OwnerRow::from(&row)))
            .transpose()
    }

    async fn get_owners(&self, owner_ids: Vec<i64>) -> DomainResult<Vec<Owner>> {
        if owner_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT owner_id, email, nid, radius_km, active
                 FROM owners
                 WHERE owner_id = ANY($1)
                 ORDER BY owner_id",
                &[&owner_ids],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(requested = owner_ids.len(), found = rows.len(), "fetched owners");

        rows.iter()
            .map(|row| Owner::try_from(OwnerRow::from(row)))
            .collect()
    }
}
