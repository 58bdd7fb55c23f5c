//! 存储记录定义
//!
//! 设备、点位、告警规则由外部管理系统维护，这里只读；
//! 测量值、告警状态与告警事件由实时引擎写入。

use domain::{
    AlarmClassification, AlarmCondition, AlarmEventKind, AlarmSeverity, Scaling, TransportKind,
    UnknownVariant, ValueKind,
};
use serde::{Deserialize, Serialize};

/// 设备记录。
///
/// `transport` 保留存储中的原始取值，采集启动时再解析；
/// 未知取值只影响该设备，不影响整轮扫描。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    pub project_id: String,
    pub name: String,
    pub transport: String,
    /// 传输相关连接参数（host/port/unit_id、broker 地址等）
    pub connection: serde_json::Value,
    pub enabled: bool,
}

impl DeviceRecord {
    pub fn transport_kind(&self) -> Result<TransportKind, UnknownVariant> {
        self.transport.parse()
    }
}

/// 点位记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub tag_id: String,
    pub device_id: String,
    pub name: String,
    /// 寄存器地址、MQTT 主题过滤器或发生器名称
    pub address: String,
    pub value_kind: ValueKind,
    pub scaling: Option<Scaling>,
    pub deadband: f64,
    pub unit: Option<String>,
    /// 单点位采集周期（发生器使用）
    pub interval_ms: Option<u64>,
    pub options: Option<serde_json::Value>,
}

/// 告警规则记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRuleRecord {
    pub rule_id: String,
    pub project_id: String,
    pub tag_id: String,
    pub name: String,
    pub condition: AlarmCondition,
    pub threshold: f64,
    pub severity: AlarmSeverity,
    pub deadband: f64,
    pub delay_ms: u64,
    pub enabled: bool,
}

/// 告警状态记录（每条规则一行，首次评估时创建）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmStateRecord {
    pub rule_id: String,
    pub classification: AlarmClassification,
    pub last_value: Option<f64>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub triggered_at_ms: Option<i64>,
    /// 延时告警：条件开始持续满足的时间
    pub pending_since_ms: Option<i64>,
    pub updated_at_ms: i64,
}

impl AlarmStateRecord {
    pub fn normal(rule_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            rule_id: rule_id.into(),
            classification: AlarmClassification::Normal,
            last_value: None,
            acknowledged: false,
            acknowledged_by: None,
            triggered_at_ms: None,
            pending_since_ms: None,
            updated_at_ms: now_ms,
        }
    }
}

/// 告警事件记录（追加写）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEventRecord {
    pub event_id: String,
    pub rule_id: String,
    pub project_id: String,
    pub tag_id: String,
    pub kind: AlarmEventKind,
    pub value: Option<f64>,
    pub threshold: f64,
    pub severity: AlarmSeverity,
    pub acknowledged_by: Option<String>,
    pub message: Option<String>,
    pub ts_ms: i64,
}
