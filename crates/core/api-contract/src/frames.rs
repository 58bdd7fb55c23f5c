//! 实时推送协议：WebSocket 入站消息与出站帧。
//!
//! 出站帧统一为 `{type, data, projectId?, timestamp}`，入站消息按 `type` 分发。
//! ID 字段同时接受字符串和数字（前端会混用）。

use async_trait::async_trait;
use domain::now_epoch_ms;
use serde::{Deserialize, Deserializer, Serialize};

/// 出站帧类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Measurement,
    DeviceStatus,
    AlarmTriggered,
    AlarmCleared,
    AlarmAcknowledged,
    ActiveAlarms,
    AlarmSummary,
    CurrentData,
    Connected,
    Subscribed,
    Unsubscribed,
    Pong,
    Error,
}

/// 出站帧。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub timestamp: i64,
}

impl OutboundFrame {
    /// 不带项目作用域的帧（握手、pong、错误）。
    pub fn new(frame_type: FrameType, data: serde_json::Value) -> Self {
        Self {
            frame_type,
            data,
            project_id: None,
            timestamp: now_epoch_ms(),
        }
    }

    /// 项目作用域帧。
    pub fn for_project(
        frame_type: FrameType,
        project_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            frame_type,
            data,
            project_id: Some(project_id.into()),
            timestamp: now_epoch_ms(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            FrameType::Error,
            serde_json::json!({ "message": message.into() }),
        )
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 入站消息。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Ping,
    SubscribeProject {
        #[serde(rename = "projectId", alias = "project_id", deserialize_with = "de_id")]
        project_id: String,
    },
    UnsubscribeProject {
        #[serde(rename = "projectId", alias = "project_id", deserialize_with = "de_id")]
        project_id: String,
    },
    AcknowledgeAlarm {
        #[serde(
            rename = "alarmId",
            alias = "ruleId",
            alias = "alarm_id",
            deserialize_with = "de_id"
        )]
        alarm_id: String,
        #[serde(default)]
        message: Option<String>,
    },
    GetActiveAlarms {
        #[serde(
            rename = "projectId",
            alias = "project_id",
            default,
            deserialize_with = "de_opt_id"
        )]
        project_id: Option<String>,
    },
    GetDiagramRealtime {
        #[serde(
            rename = "projectId",
            alias = "project_id",
            default,
            deserialize_with = "de_opt_id"
        )]
        project_id: Option<String>,
        #[serde(
            rename = "diagramId",
            alias = "diagram_id",
            default,
            deserialize_with = "de_opt_id"
        )]
        diagram_id: Option<String>,
    },
}

const KNOWN_TYPES: &[&str] = &[
    "ping",
    "subscribe_project",
    "unsubscribe_project",
    "acknowledge_alarm",
    "get_active_alarms",
    "get_diagram_realtime",
];

/// 入站帧解析错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

/// 解析入站文本帧；未知类型与格式错误分开返回，便于调用方分别记录。
pub fn parse_inbound(text: &str) -> Result<InboundMessage, FrameError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|err| FrameError::Malformed(err.to_string()))?;
    let kind = value
        .get("type")
        .and_then(|kind| kind.as_str())
        .ok_or_else(|| FrameError::Malformed("missing type".to_string()))?;
    if !KNOWN_TYPES.contains(&kind) {
        return Err(FrameError::UnknownType(kind.to_string()));
    }
    serde_json::from_value(value).map_err(|err| FrameError::Malformed(err.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
}

/// 按项目广播的能力（实时推送中心实现，采集与告警持有）。
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// 投递给当前订阅该项目且连接仍打开的客户端，返回实际投递数。
    async fn broadcast(&self, project_id: &str, frame: OutboundFrame) -> usize;
}

/// 空广播器（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopBroadcaster;

#[async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn broadcast(&self, _project_id: &str, _frame: OutboundFrame) -> usize {
        0
    }
}
