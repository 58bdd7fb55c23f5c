use crate::data::UnknownVariant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 告警条件类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCondition {
    High,
    Low,
    HighHigh,
    LowLow,
}

impl AlarmCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmCondition::High => "high",
            AlarmCondition::Low => "low",
            AlarmCondition::HighHigh => "high_high",
            AlarmCondition::LowLow => "low_low",
        }
    }
}

impl FromStr for AlarmCondition {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "high" => Ok(AlarmCondition::High),
            "low" => Ok(AlarmCondition::Low),
            "high_high" | "highhigh" => Ok(AlarmCondition::HighHigh),
            "low_low" | "lowlow" => Ok(AlarmCondition::LowLow),
            _ => Err(UnknownVariant {
                kind: "alarm condition",
                value: value.to_string(),
            }),
        }
    }
}

/// 告警级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmSeverity {
    Info,
    Warning,
    Critical,
}

impl AlarmSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmSeverity::Info => "info",
            AlarmSeverity::Warning => "warning",
            AlarmSeverity::Critical => "critical",
        }
    }
}

impl FromStr for AlarmSeverity {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" | "low" => Ok(AlarmSeverity::Info),
            "warning" | "medium" => Ok(AlarmSeverity::Warning),
            "critical" | "high" => Ok(AlarmSeverity::Critical),
            _ => Err(UnknownVariant {
                kind: "alarm severity",
                value: value.to_string(),
            }),
        }
    }
}

/// 规则当前分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlarmClassification {
    #[default]
    Normal,
    Triggered,
}

impl AlarmClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmClassification::Normal => "normal",
            AlarmClassification::Triggered => "triggered",
        }
    }
}

impl FromStr for AlarmClassification {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(AlarmClassification::Normal),
            "triggered" | "active" => Ok(AlarmClassification::Triggered),
            _ => Err(UnknownVariant {
                kind: "alarm classification",
                value: value.to_string(),
            }),
        }
    }
}

/// 告警事件类型（追加写日志）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmEventKind {
    Triggered,
    Cleared,
    Acknowledged,
}

impl AlarmEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmEventKind::Triggered => "triggered",
            AlarmEventKind::Cleared => "cleared",
            AlarmEventKind::Acknowledged => "acknowledged",
        }
    }
}

impl fmt::Display for AlarmEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmEventKind {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "triggered" => Ok(AlarmEventKind::Triggered),
            "cleared" => Ok(AlarmEventKind::Cleared),
            "acknowledged" => Ok(AlarmEventKind::Acknowledged),
            _ => Err(UnknownVariant {
                kind: "alarm event kind",
                value: value.to_string(),
            }),
        }
    }
}
