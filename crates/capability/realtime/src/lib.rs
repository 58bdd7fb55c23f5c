//! # 实时推送能力模块
//!
//! [`RealtimeHub`] 负责连接认证、客户端登记、按项目订阅、广播与心跳。
//! 与传输层解耦：每个客户端持有一个 [`HubMessage`] 通道，由服务端的 WebSocket
//! 发送任务转发到 socket。
//!
//! 入站消息经 [`RealtimeHub::handle_inbound`] 分发，需要采集或告警数据的请求
//! 通过 [`HubCallbacks`] 回调给服务端装配层。

mod callbacks;
mod hub;
mod inbound;

use scada_auth::AuthError;

pub use callbacks::{CallbackError, HubCallbacks};
pub use hub::{ClientReceiver, RealtimeHub};

/// 正常关闭
pub const CLOSE_NORMAL: u16 = 1000;
/// 服务端主动断开（心跳超时）
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// 策略违规（握手认证失败）
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// 发往单个客户端的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubMessage {
    Text(String),
    Ping,
    Close { code: u16, reason: String },
}

/// 握手失败；连接不会被登记。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("handshake rejected: {0}")]
pub struct HandshakeError(#[from] pub AuthError);

impl HandshakeError {
    pub fn close_code(&self) -> u16 {
        CLOSE_POLICY_VIOLATION
    }
}
