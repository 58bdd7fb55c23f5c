use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 枚举解析错误（存储中的未知取值）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// 设备传输方式（闭集）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// 轮询型寄存器控制器（Modbus TCP）
    Modbus,
    /// 发布/订阅 broker（MQTT）
    Mqtt,
    /// 模拟发生器（测试用）
    Generator,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Modbus => "modbus",
            TransportKind::Mqtt => "mqtt",
            TransportKind::Generator => "generator",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "modbus" | "modbus_tcp" | "modbus-tcp" => Ok(TransportKind::Modbus),
            "mqtt" => Ok(TransportKind::Mqtt),
            "generator" | "simulator" => Ok(TransportKind::Generator),
            _ => Err(UnknownVariant {
                kind: "transport",
                value: value.to_string(),
            }),
        }
    }
}

/// 点位值类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Float,
    Integer,
    Boolean,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Float => "float",
            ValueKind::Integer => "integer",
            ValueKind::Boolean => "boolean",
        }
    }
}

impl FromStr for ValueKind {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "float" | "double" | "f64" => Ok(ValueKind::Float),
            "integer" | "int" | "i64" => Ok(ValueKind::Integer),
            "boolean" | "bool" => Ok(ValueKind::Boolean),
            _ => Err(UnknownVariant {
                kind: "value kind",
                value: value.to_string(),
            }),
        }
    }
}

/// 数据质量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    #[default]
    Good,
    Uncertain,
    Bad,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Uncertain => "uncertain",
            Quality::Bad => "bad",
        }
    }
}

impl FromStr for Quality {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "good" => Ok(Quality::Good),
            "uncertain" => Ok(Quality::Uncertain),
            "bad" => Ok(Quality::Bad),
            _ => Err(UnknownVariant {
                kind: "quality",
                value: value.to_string(),
            }),
        }
    }
}

/// 线性缩放：原始量程 -> 工程量程。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scaling {
    pub raw_min: f64,
    pub raw_max: f64,
    pub eng_min: f64,
    pub eng_max: f64,
}

/// 已接受的测量值（过死区后）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub tag_id: String,
    pub device_id: String,
    pub project_id: String,
    pub value: f64,
    pub ts_ms: i64,
    pub quality: Quality,
    pub source: TransportKind,
}
