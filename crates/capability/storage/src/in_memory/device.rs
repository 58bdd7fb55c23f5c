//! 设备与点位内存存储实现
//!
//! 设备和点位放在同一个存储里，便于判断“至少一个点位”。

use crate::error::StorageError;
use crate::models::{DeviceRecord, TagRecord};
use crate::traits::{DeviceStore, TagStore};
use std::collections::HashMap;
use std::sync::RwLock;

/// 设备内存存储
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, DeviceRecord>>,
    tags: RwLock<HashMap<String, TagRecord>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            tags: RwLock::new(HashMap::new()),
        }
    }

    /// 新增或替换设备
    pub fn upsert_device(&self, record: DeviceRecord) -> Result<(), StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(record.device_id.clone(), record);
        Ok(())
    }

    /// 删除设备及其点位
    pub fn remove_device(&self, device_id: &str) -> Result<bool, StorageError> {
        let removed = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?
            .remove(device_id)
            .is_some();
        self.tags
            .write()
            .map_err(|_| StorageError::new("lock failed"))?
            .retain(|_, tag| tag.device_id != device_id);
        Ok(removed)
    }

    /// 新增或替换点位
    pub fn upsert_tag(&self, record: TagRecord) -> Result<(), StorageError> {
        let mut map = self
            .tags
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(record.tag_id.clone(), record);
        Ok(())
    }

    pub fn remove_tag(&self, tag_id: &str) -> Result<bool, StorageError> {
        let mut map = self
            .tags
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(tag_id).is_some())
    }
}

impl Default for InMemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn list_active_devices(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let tags = self
            .tags
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<DeviceRecord> = devices
            .values()
            .filter(|device| device.enabled)
            .filter(|device| tags.values().any(|tag| tag.device_id == device.device_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(items)
    }

    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, StorageError> {
        let item = self
            .devices
            .read()
            .ok()
            .and_then(|map| map.get(device_id).cloned());
        Ok(item)
    }
}

#[async_trait::async_trait]
impl TagStore for InMemoryDeviceStore {
    async fn list_tags_by_device(&self, device_id: &str) -> Result<Vec<TagRecord>, StorageError> {
        let map = self
            .tags
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<TagRecord> = map
            .values()
            .filter(|tag| tag.device_id == device_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.tag_id.cmp(&b.tag_id));
        Ok(items)
    }
}
