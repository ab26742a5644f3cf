use crate::domain::{
    Device, DeviceRepository, DomainError, DomainResult, ListGroupMembersRepoInput,
    UpdateDeviceLocationRepoInput,
};
use crate::geo::GeoPoint;
use crate::nid::Nid;
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, info, instrument};

/// Column list for `devices d`; read back with [`DeviceRow::from_row`]
pub(crate) const DEVICE_COLUMNS: &str = "d.device_id, d.hardware_id, d.owner_id, d.group_id, d.nid, \
     d.latitude, d.longitude, d.webhook_url, d.retry_limit, d.active, d.created_at, d.updated_at";

pub(crate) const DEVICE_COLUMN_COUNT: usize = 12;

/// Device row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub device_id: i64,
    pub hardware_id: String,
    pub owner_id: i64,
    pub group_id: i64,
    pub nid: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub webhook_url: Option<String>,
    pub retry_limit: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceRow {
    /// Read [`DEVICE_COLUMNS`] starting at column `start`
    pub(crate) fn from_row(row: &Row, start: usize) -> Self {
        Self {
            device_id: row.get(start),
            hardware_id: row.get(start + 1),
            owner_id: row.get(start + 2),
            group_id: row.get(start + 3),
            nid: row.get(start + 4),
            latitude: row.get(start + 5),
            longitude: row.get(start + 6),
            webhook_url: row.get(start + 7),
            retry_limit: row.get(start + 8),
            active: row.get(start + 9),
            created_at: row.get(start + 10),
            updated_at: row.get(start + 11),
        }
    }
}

impl TryFrom<DeviceRow> for Device {
    type Error = DomainError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)?),
            _ => None,
        };

        Ok(Device {
            device_id: row.device_id,
            hardware_id: row.hardware_id,
            owner_id: row.owner_id,
            group_id: row.group_id,
            nid: row.nid.map(Nid::from_i64).transpose()?,
            location,
            webhook_url: row.webhook_url,
            retry_limit: u32::try_from(row.retry_limit).unwrap_or(0),
            active: row.active,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

fn rows_to_devices(rows: Vec<Row>) -> DomainResult<Vec<Device>> {
    rows.iter()
        .map(|row| Device::try_from(DeviceRow::from_row(row, 0)))
        .collect()
}

#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    async fn get_device(&self, device_id: i64) -> DomainResult<Option<Device>> {
        debug!(device_id, "getting device from database");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!("SELECT {} FROM devices d WHERE d.device_id = $1", DEVICE_COLUMNS),
                &[&device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.map(|row| Device::try_from(DeviceRow::from_row(&row, 0)))
            .transpose()
    }

    async fn get_device_by_hardware_id(&self, hardware_id: &str) -> DomainResult<Option<Device>> {
        debug!(hardware_id, "getting device by hardware id");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!("SELECT {} FROM devices d WHERE d.hardware_id = $1", DEVICE_COLUMNS),
                &[&hardware_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.map(|row| Device::try_from(DeviceRow::from_row(&row, 0)))
            .transpose()
    }

    #[instrument(skip(self), fields(group_id = input.group_id))]
    async fn list_active_group_members(
        &self,
        input: ListGroupMembersRepoInput,
    ) -> DomainResult<Vec<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM devices d
                     WHERE d.group_id = $1
                       AND d.active
                       AND ($2::BIGINT IS NULL OR d.device_id <> $2)
                     ORDER BY d.device_id",
                    DEVICE_COLUMNS
                ),
                &[&input.group_id, &input.exclude_device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(count = rows.len(), "listed active group members");
        rows_to_devices(rows)
    }

    async fn list_active_devices_by_owner(&self, owner_id: i64) -> DomainResult<Vec<Device>> {
        debug!(owner_id, "listing active devices for owner");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM devices d
                     WHERE d.owner_id = $1 AND d.active
                     ORDER BY d.device_id",
                    DEVICE_COLUMNS
                ),
                &[&owner_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        rows_to_devices(rows)
    }

    async fn update_device_location(
        &self,
        input: UpdateDeviceLocationRepoInput,
    ) -> DomainResult<Device> {
        debug!(device_id = input.device_id, "updating device location");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let latitude = input.location.latitude();
        let longitude = input.location.longitude();
        let now = Utc::now();

        let row = conn
            .query_opt(
                &format!(
                    "UPDATE devices d
                     SET latitude = $1, longitude = $2, updated_at = $3
                     WHERE d.device_id = $4
                     RETURNING {}",
                    DEVICE_COLUMNS
                ),
                &[&latitude, &longitude, &now, &input.device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match row {
            Some(row) => {
                info!(device_id = input.device_id, "device location updated");
                Device::try_from(DeviceRow::from_row(&row, 0))
            }
            None => Err(DomainError::DeviceNotFound(input.device_id.to_string())),
        }
    }
}
