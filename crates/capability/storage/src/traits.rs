//! 存储接口 Trait 定义
//!
//! 所有接口返回 StorageError，使用 async_trait 支持动态分发。

use crate::error::StorageError;
use crate::models::{AlarmEventRecord, AlarmRuleRecord, AlarmStateRecord, DeviceRecord, TagRecord};
use async_trait::async_trait;
use domain::Measurement;

/// 设备存储接口
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// 列出启用且至少配置一个点位的设备
    async fn list_active_devices(&self) -> Result<Vec<DeviceRecord>, StorageError>;

    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, StorageError>;
}

/// 点位存储接口
#[async_trait]
pub trait TagStore: Send + Sync {
    async fn list_tags_by_device(&self, device_id: &str) -> Result<Vec<TagRecord>, StorageError>;
}

/// 测量值存储接口
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    async fn write_measurement(&self, value: &Measurement) -> Result<(), StorageError>;
}

/// 告警存储接口
#[async_trait]
pub trait AlarmStore: Send + Sync {
    async fn list_rules_for_tag(&self, tag_id: &str)
    -> Result<Vec<AlarmRuleRecord>, StorageError>;

    async fn list_rules_by_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<AlarmRuleRecord>, StorageError>;

    async fn find_rule(&self, rule_id: &str) -> Result<Option<AlarmRuleRecord>, StorageError>;

    async fn find_state(&self, rule_id: &str) -> Result<Option<AlarmStateRecord>, StorageError>;

    async fn upsert_state(&self, state: &AlarmStateRecord) -> Result<(), StorageError>;

    async fn append_event(&self, event: &AlarmEventRecord) -> Result<(), StorageError>;

    /// 按时间顺序返回规则的事件
    async fn list_events(&self, rule_id: &str) -> Result<Vec<AlarmEventRecord>, StorageError>;
}
