//! 测量值内存实现

use crate::error::StorageError;
use crate::traits::MeasurementStore;
use domain::Measurement;
use std::sync::RwLock;

/// 测量值内存存储
pub struct InMemoryMeasurementStore {
    values: RwLock<Vec<Measurement>>,
}

impl InMemoryMeasurementStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(Vec::new()),
        }
    }

    /// 获取当前累计的测量值数量（用于测试）
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按写入顺序返回某点位的全部测量值（用于测试）
    pub fn values_for_tag(&self, tag_id: &str) -> Vec<Measurement> {
        self.values
            .read()
            .map(|values| {
                values
                    .iter()
                    .filter(|item| item.tag_id == tag_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for InMemoryMeasurementStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MeasurementStore for InMemoryMeasurementStore {
    async fn write_measurement(&self, value: &Measurement) -> Result<(), StorageError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        values.push(value.clone());
        Ok(())
    }
}
