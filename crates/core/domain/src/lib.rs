pub mod alarm;
pub mod data;

pub use alarm::{AlarmClassification, AlarmCondition, AlarmEventKind, AlarmSeverity};
pub use data::{Measurement, Quality, Scaling, TransportKind, UnknownVariant, ValueKind};

use serde::{Deserialize, Serialize};

/// 已校验身份：所有实时连接共享的调用方上下文。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

impl Identity {
    /// 构造显式身份。
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            roles,
        }
    }

    /// 系统内部身份（采集链路使用）。
    pub fn system() -> Self {
        Self::new("system", "system", Vec::new())
    }
}

/// 当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
