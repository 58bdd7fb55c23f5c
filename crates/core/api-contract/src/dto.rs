//! 管理接口 DTO。

use serde::{Deserialize, Serialize};

/// 实时链路计数快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub ws_connections_opened: u64,
    pub ws_connections_closed: u64,
    pub ws_handshake_rejected: u64,
    pub ws_clients_evicted: u64,
    pub frames_delivered: u64,
    pub frames_failed: u64,
    pub inbound_ignored: u64,
    pub alarm_triggered: u64,
    pub alarm_cleared: u64,
    pub alarm_acknowledged: u64,
}

/// 健康检查
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub ok: bool,
    pub collector_running: bool,
    pub ws_clients: usize,
}
