//! 注册表对外返回的统计与状态结构。

use domain::TransportKind;
use serde::Serialize;

/// 采集统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorStatistics {
    pub running: bool,
    pub total_readings: u64,
    pub successful_readings: u64,
    pub failed_readings: u64,
    /// 被死区过滤的读数
    pub suppressed_readings: u64,
    pub active_devices: usize,
    pub active_tags: usize,
    pub uptime_seconds: u64,
}

/// 单个采集器的运行信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRunInfo {
    pub device_id: String,
    pub name: String,
    pub project_id: String,
    pub transport: TransportKind,
    /// 适配器连接状态
    pub state: String,
    pub started_at_ms: i64,
    pub last_activity_ms: Option<i64>,
    pub tag_count: usize,
}

/// 点位最新值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentValue {
    pub tag_id: String,
    pub device_id: String,
    pub value: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFailure {
    pub device_id: String,
    pub error: String,
}

/// 一轮对账的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub started: Vec<String>,
    /// 配置变化后重建的采集器
    pub replaced: Vec<String>,
    /// 设备已删除、停用或不再有点位
    pub evicted: Vec<String>,
    pub unchanged: usize,
    pub failed: Vec<ScanFailure>,
}
