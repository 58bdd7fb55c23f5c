//! # 采集能力模块
//!
//! 采集注册表为每个设备维护至多一个采集器，并周期性地与存储中的设备、点位配置对账。
//!
//! 数据链路：
//!
//! ```text
//! 适配器读数 → 缩放 → 死区过滤 → 写入 → 缓存最新值 → 推送 measurement → 告警评估
//! ```
//!
//! - [`CollectorRegistry`]：生命周期（start / stop / 单设备启停 / 对账）与统计
//! - [`ReadingProcessor`]：单条读数的处理链路
//! - [`RetryPolicy`]：连接重试（指数退避）

mod acquisition;
mod processor;
mod registry;
mod report;
mod retry;

use std::time::Duration;

pub use processor::{ReadingOutcome, ReadingProcessor, coerce_value, passes_deadband, scale_value};
pub use registry::CollectorRegistry;
pub use report::{CollectorStatistics, CurrentValue, DeviceRunInfo, ScanFailure, ScanReport};
pub use retry::{RetryPolicy, connect_with_retry};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("collector already running")]
    AlreadyRunning,
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("device has no tags configured: {0}")]
    NotConfigured(String),
    #[error("invalid device configuration: {0}")]
    Configuration(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<scada_storage::StorageError> for CollectorError {
    fn from(err: scada_storage::StorageError) -> Self {
        CollectorError::Storage(err.to_string())
    }
}

/// 注册表参数。
#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    /// 对账周期
    pub scan_interval: Duration,
    /// 设备未配置轮询周期、点位未配置采集周期时使用
    pub default_poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            default_poll_interval: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
        }
    }
}
