//! Postgres 测量值写入实现

use crate::error::StorageError;
use crate::traits::MeasurementStore;
use domain::Measurement;
use sqlx::PgPool;

pub struct PgMeasurementStore {
    pub pool: PgPool,
}

impl PgMeasurementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MeasurementStore for PgMeasurementStore {
    async fn write_measurement(&self, value: &Measurement) -> Result<(), StorageError> {
        sqlx::query(
            "insert into measurements (tag_id, device_id, project_id, ts, value, quality, source) \
             values ($1, $2, $3, to_timestamp($4 / 1000.0), $5, $6, $7)",
        )
        .bind(&value.tag_id)
        .bind(&value.device_id)
        .bind(&value.project_id)
        .bind(value.ts_ms as f64)
        .bind(value.value)
        .bind(value.quality.as_str())
        .bind(value.source.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
