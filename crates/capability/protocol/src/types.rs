//! 协议相关类型定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// 设备连接状态
///
/// disconnected → connecting → connected → {error, disconnected}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

/// 探测失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    Refused,
    Timeout,
    HostUnreachable,
    /// 可达但延迟超过阈值（connected 仍为 true）
    Degraded,
    InvalidConfig,
}

/// 探测结果（探测本身从不返回错误）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub connected: bool,
    pub message: String,
    pub latency_ms: Option<u64>,
    pub failure: Option<ProbeFailure>,
}

impl ProbeResult {
    pub fn reachable(latency_ms: u64) -> Self {
        Self {
            connected: true,
            message: "reachable".to_string(),
            latency_ms: Some(latency_ms),
            failure: None,
        }
    }

    pub fn degraded(latency_ms: u64, threshold_ms: u64) -> Self {
        Self {
            connected: true,
            message: format!("latency {latency_ms} ms exceeds {threshold_ms} ms"),
            latency_ms: Some(latency_ms),
            failure: Some(ProbeFailure::Degraded),
        }
    }

    pub fn failed(failure: ProbeFailure, message: impl Into<String>) -> Self {
        Self {
            connected: false,
            message: message.into(),
            latency_ms: None,
            failure: Some(failure),
        }
    }
}

/// 探测参数
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub timeout: Duration,
    pub degraded_threshold: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            degraded_threshold: Duration::from_millis(1000),
        }
    }
}

/// 设备连接状态表（各适配器共用）
#[derive(Debug, Default)]
pub(crate) struct StateTable {
    states: RwLock<HashMap<String, ConnectionState>>,
}

impl StateTable {
    pub(crate) fn set(&self, device_id: &str, state: ConnectionState) {
        if let Ok(mut map) = self.states.write() {
            map.insert(device_id.to_string(), state);
        }
    }

    pub(crate) fn get(&self, device_id: &str) -> ConnectionState {
        self.states
            .read()
            .ok()
            .and_then(|map| map.get(device_id).copied())
            .unwrap_or_default()
    }
}

/// Modbus 寄存器数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModbusDataType {
    /// 16位有符号整数
    #[default]
    Int16,
    /// 16位无符号整数
    Uint16,
    /// 32位有符号整数（2个寄存器）
    Int32,
    /// 32位无符号整数（2个寄存器）
    Uint32,
    /// 32位浮点数（2个寄存器）
    Float32,
    /// 64位浮点数（4个寄存器）
    Float64,
}

impl ModbusDataType {
    pub fn register_count(&self) -> u16 {
        match self {
            ModbusDataType::Int16 | ModbusDataType::Uint16 => 1,
            ModbusDataType::Int32 | ModbusDataType::Uint32 | ModbusDataType::Float32 => 2,
            ModbusDataType::Float64 => 4,
        }
    }
}

/// 点位寄存器地址（Modbus）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusTagAddress {
    /// 功能码 1/2/3/4
    #[serde(default = "default_function_code")]
    pub function_code: u8,
    /// 寄存器起始地址
    pub register_address: u16,
    /// 寄存器数量（缺省按数据类型推断）
    #[serde(default)]
    pub register_count: Option<u16>,
    #[serde(default)]
    pub data_type: ModbusDataType,
    /// 字节序（big_endian / little_endian，little_endian 时寄存器按字逆序）
    #[serde(default = "default_byte_order")]
    pub byte_order: String,
}

fn default_function_code() -> u8 {
    3
}

fn default_byte_order() -> String {
    "big_endian".to_string()
}

impl ModbusTagAddress {
    pub fn effective_count(&self) -> u16 {
        match self.function_code {
            1 | 2 => 1,
            _ => self
                .register_count
                .unwrap_or(0)
                .max(self.data_type.register_count()),
        }
    }
}

/// 设备连接参数（Modbus）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConnection {
    pub host: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// 从站 ID (1-247)
    #[serde(default = "default_unit_id", alias = "slave_id", alias = "unitId")]
    pub unit_id: u8,
    /// 读超时（毫秒）
    #[serde(default = "default_read_timeout", alias = "timeout")]
    pub read_timeout_ms: u64,
    /// 轮询间隔（毫秒，缺省使用全局配置）
    #[serde(default, alias = "pollInterval", alias = "poll_interval")]
    pub poll_interval_ms: Option<u64>,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_read_timeout() -> u64 {
    3000
}

/// 设备连接参数（MQTT）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConnection {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "clientId")]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}
