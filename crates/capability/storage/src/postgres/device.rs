//! Postgres 设备与点位存储实现

use crate::error::StorageError;
use crate::models::{DeviceRecord, TagRecord};
use crate::traits::{DeviceStore, TagStore};
use domain::{Scaling, ValueKind};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const DEVICE_COLUMNS: &str =
    "d.device_id, d.project_id, d.name, d.transport, d.connection::text as connection, d.enabled";

pub struct PgDeviceStore {
    pub pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn device_from_row(row: &PgRow) -> Result<DeviceRecord, StorageError> {
    let connection: Option<String> = row.try_get("connection")?;
    let connection = match connection {
        Some(text) => serde_json::from_str(&text)?,
        None => serde_json::Value::Object(Default::default()),
    };
    Ok(DeviceRecord {
        device_id: row.try_get("device_id")?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        transport: row.try_get("transport")?,
        connection,
        enabled: row.try_get("enabled")?,
    })
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn list_active_devices(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let sql = format!(
            "select {DEVICE_COLUMNS} from devices d \
             where d.enabled and exists (select 1 from tags t where t.device_id = d.device_id) \
             order by d.device_id"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut devices = Vec::with_capacity(rows.len());
        for row in rows {
            devices.push(device_from_row(&row)?);
        }
        Ok(devices)
    }

    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, StorageError> {
        let sql = format!("select {DEVICE_COLUMNS} from devices d where d.device_id = $1");
        let row = sqlx::query(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(device_from_row(&row)?))
    }
}

pub struct PgTagStore {
    pub pool: PgPool,
}

impl PgTagStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tag_from_row(row: &PgRow) -> Result<TagRecord, StorageError> {
    let value_kind: String = row.try_get("value_kind")?;
    let scaling: Option<String> = row.try_get("scaling")?;
    let scaling = match scaling {
        Some(text) => serde_json::from_str::<Option<Scaling>>(&text)?,
        None => None,
    };
    let options: Option<String> = row.try_get("options")?;
    let options = match options {
        Some(text) => Some(serde_json::from_str(&text)?),
        None => None,
    };
    let interval_ms: Option<i64> = row.try_get("interval_ms")?;
    Ok(TagRecord {
        tag_id: row.try_get("tag_id")?,
        device_id: row.try_get("device_id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        value_kind: value_kind.parse::<ValueKind>()?,
        scaling,
        deadband: row.try_get("deadband")?,
        unit: row.try_get("unit")?,
        interval_ms: interval_ms.map(|value| value.max(0) as u64),
        options,
    })
}

#[async_trait::async_trait]
impl TagStore for PgTagStore {
    async fn list_tags_by_device(&self, device_id: &str) -> Result<Vec<TagRecord>, StorageError> {
        let rows = sqlx::query(
            "select tag_id, device_id, name, address, value_kind, scaling::text as scaling, \
             deadband, unit, interval_ms, options::text as options \
             from tags where device_id = $1 order by tag_id",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        let mut tags = Vec::with_capacity(rows.len());
        for row in rows {
            tags.push(tag_from_row(&row)?);
        }
        Ok(tags)
    }
}
