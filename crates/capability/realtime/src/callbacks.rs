//! 实时中心对外的窄回调接口（由服务端用采集注册表与告警评估器实现）。

use api_contract::OutboundFrame;
use async_trait::async_trait;
use domain::Identity;

/// 回调失败；错误信息以 `error` 帧回给请求方。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("{0}")]
    Rejected(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait HubCallbacks: Send + Sync {
    /// 订阅成功后推送给该客户端的一次性快照帧
    async fn on_subscribe(
        &self,
        identity: &Identity,
        project_id: &str,
    ) -> Result<Vec<OutboundFrame>, CallbackError>;

    async fn acknowledge_alarm(
        &self,
        identity: &Identity,
        alarm_id: &str,
        message: Option<String>,
    ) -> Result<(), CallbackError>;

    /// 返回 `active_alarms` 帧
    async fn active_alarms(&self, project_ids: &[String]) -> Result<OutboundFrame, CallbackError>;

    /// 返回 `current_data` 帧
    async fn diagram_realtime(
        &self,
        project_id: &str,
        diagram_id: Option<&str>,
    ) -> Result<OutboundFrame, CallbackError>;
}
