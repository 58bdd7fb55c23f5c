//! 客户端登记、订阅索引、广播与心跳。
//!
//! 正向索引（客户端 → 订阅）与反向索引（项目 → 客户端）放在同一个 `HubState` 里，
//! 由一把 `RwLock` 保护，所有修改都同时更新两侧。

use api_contract::{Broadcaster, FrameType, OutboundFrame};
use async_trait::async_trait;
use domain::Identity;
use scada_auth::{AuthError, IdentityVerifier};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{CLOSE_GOING_AWAY, CLOSE_NORMAL, HandshakeError, HubMessage};

/// 连续未响应的 ping 次数达到该值即断开
const MAX_MISSED_PINGS: u32 = 2;

pub type ClientReceiver = mpsc::UnboundedReceiver<HubMessage>;

struct ClientEntry {
    identity: Identity,
    sender: mpsc::UnboundedSender<HubMessage>,
    subscriptions: HashSet<String>,
    alive: bool,
    missed_pings: u32,
}

#[derive(Default)]
struct HubState {
    clients: HashMap<String, ClientEntry>,
    projects: HashMap<String, HashSet<String>>,
}

impl HubState {
    fn subscribe(&mut self, client_id: &str, project_id: &str) -> bool {
        let Some(client) = self.clients.get_mut(client_id) else {
            return false;
        };
        client.subscriptions.insert(project_id.to_string());
        self.projects
            .entry(project_id.to_string())
            .or_default()
            .insert(client_id.to_string());
        true
    }

    fn unsubscribe(&mut self, client_id: &str, project_id: &str) -> bool {
        let Some(client) = self.clients.get_mut(client_id) else {
            return false;
        };
        let removed = client.subscriptions.remove(project_id);
        self.detach(client_id, project_id);
        removed
    }

    fn remove(&mut self, client_id: &str) -> Option<ClientEntry> {
        let client = self.clients.remove(client_id)?;
        for project_id in &client.subscriptions {
            self.detach(client_id, project_id);
        }
        Some(client)
    }

    fn detach(&mut self, client_id: &str, project_id: &str) {
        if let Some(members) = self.projects.get_mut(project_id) {
            members.remove(client_id);
            if members.is_empty() {
                self.projects.remove(project_id);
            }
        }
    }
}

struct HeartbeatTask {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// 实时推送中心
pub struct RealtimeHub {
    verifier: Arc<dyn IdentityVerifier>,
    state: RwLock<HubState>,
    heartbeat: Mutex<Option<HeartbeatTask>>,
}

impl RealtimeHub {
    pub fn new(verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            verifier,
            state: RwLock::new(HubState::default()),
            heartbeat: Mutex::new(None),
        }
    }

    /// 握手认证；失败时调用方以 1008 关闭连接，不登记客户端。
    pub fn authenticate(&self, token: Option<&str>) -> Result<Identity, HandshakeError> {
        let result = match token.map(str::trim) {
            None | Some("") => Err(AuthError::TokenMissing),
            Some(token) => self.verifier.verify(token),
        };
        result.map_err(|err| {
            scada_telemetry::record_ws_handshake_rejected();
            warn!(target: "scada.realtime", reason = %err, "ws_handshake_rejected");
            HandshakeError(err)
        })
    }

    /// 登记已认证的客户端并发送 `connected` 帧
    pub async fn register(&self, identity: Identity) -> (String, ClientReceiver) {
        let client_id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();
        let connected = OutboundFrame::new(
            FrameType::Connected,
            serde_json::json!({
                "clientId": client_id,
                "userId": identity.user_id,
                "displayName": identity.display_name,
            }),
        );
        if let Ok(text) = connected.to_text() {
            let _ = sender.send(HubMessage::Text(text));
        }
        info!(
            target: "scada.realtime",
            client_id = %client_id,
            user_id = %identity.user_id,
            "ws_client_registered"
        );
        self.state.write().await.clients.insert(
            client_id.clone(),
            ClientEntry {
                identity,
                sender,
                subscriptions: HashSet::new(),
                alive: true,
                missed_pings: 0,
            },
        );
        scada_telemetry::record_ws_connection_opened();
        (client_id, receiver)
    }

    pub async fn unregister(&self, client_id: &str) -> bool {
        let removed = self.state.write().await.remove(client_id).is_some();
        if removed {
            scada_telemetry::record_ws_connection_closed();
            info!(target: "scada.realtime", client_id, "ws_client_unregistered");
        }
        removed
    }

    pub async fn subscribe(&self, client_id: &str, project_id: &str) -> bool {
        let subscribed = self.state.write().await.subscribe(client_id, project_id);
        if subscribed {
            debug!(target: "scada.realtime", client_id, project_id, "ws_subscribed");
        }
        subscribed
    }

    pub async fn unsubscribe(&self, client_id: &str, project_id: &str) -> bool {
        let removed = self.state.write().await.unsubscribe(client_id, project_id);
        if removed {
            debug!(target: "scada.realtime", client_id, project_id, "ws_unsubscribed");
        }
        removed
    }

    /// 收到 pong（或任意有效入站帧）时标记存活
    pub async fn mark_alive(&self, client_id: &str) {
        if let Some(client) = self.state.write().await.clients.get_mut(client_id) {
            client.alive = true;
            client.missed_pings = 0;
        }
    }

    pub async fn identity(&self, client_id: &str) -> Option<Identity> {
        self.state
            .read()
            .await
            .clients
            .get(client_id)
            .map(|client| client.identity.clone())
    }

    /// 客户端当前订阅的项目（排序）
    pub async fn subscriptions(&self, client_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut projects: Vec<String> = state
            .clients
            .get(client_id)
            .map(|client| client.subscriptions.iter().cloned().collect())
            .unwrap_or_default();
        projects.sort();
        projects
    }

    /// 订阅某项目的客户端（排序）
    pub async fn subscribers(&self, project_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut clients: Vec<String> = state
            .projects
            .get(project_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        clients.sort();
        clients
    }

    pub async fn client_count(&self) -> usize {
        self.state.read().await.clients.len()
    }

    /// 只发给一个客户端
    pub async fn send_to(&self, client_id: &str, frame: &OutboundFrame) -> bool {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(err) => {
                warn!(target: "scada.realtime", error = %err, "frame_encode_failed");
                return false;
            }
        };
        let state = self.state.read().await;
        match state.clients.get(client_id) {
            Some(client) => client.sender.send(HubMessage::Text(text)).is_ok(),
            None => false,
        }
    }

    /// 投递给订阅该项目的全部在线客户端，返回实际投递数。
    ///
    /// 通道已关闭的客户端被跳过并移除，不影响其他客户端。
    pub async fn broadcast_frame(&self, project_id: &str, frame: &OutboundFrame) -> usize {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(err) => {
                warn!(target: "scada.realtime", project_id, error = %err, "frame_encode_failed");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let state = self.state.read().await;
            let Some(members) = state.projects.get(project_id) else {
                return 0;
            };
            for client_id in members {
                let Some(client) = state.clients.get(client_id) else {
                    continue;
                };
                if client.sender.send(HubMessage::Text(text.clone())).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(client_id.clone());
                }
            }
        }

        if !closed.is_empty() {
            let mut state = self.state.write().await;
            for client_id in &closed {
                if state.remove(client_id).is_some() {
                    scada_telemetry::record_frame_failed();
                    scada_telemetry::record_ws_connection_closed();
                    debug!(target: "scada.realtime", client_id = %client_id, "ws_client_closed");
                }
            }
        }
        scada_telemetry::record_frames_delivered(delivered as u64);
        delivered
    }

    /// 心跳一轮：上轮之后未响应的客户端累计一次未响应，达到上限即断开；
    /// 其余客户端标记为未响应并发送 ping。返回被断开的客户端。
    pub async fn heartbeat_tick(&self) -> Vec<String> {
        let mut state = self.state.write().await;
        let mut evicted = Vec::new();
        for (client_id, client) in state.clients.iter_mut() {
            if client.alive {
                client.missed_pings = 0;
            } else {
                client.missed_pings += 1;
                if client.missed_pings >= MAX_MISSED_PINGS {
                    evicted.push(client_id.clone());
                    continue;
                }
            }
            client.alive = false;
            if client.sender.send(HubMessage::Ping).is_err() {
                evicted.push(client_id.clone());
            }
        }

        for client_id in &evicted {
            if let Some(client) = state.remove(client_id) {
                let _ = client.sender.send(HubMessage::Close {
                    code: CLOSE_GOING_AWAY,
                    reason: "heartbeat timeout".to_string(),
                });
                scada_telemetry::record_ws_client_evicted();
                scada_telemetry::record_ws_connection_closed();
                info!(target: "scada.realtime", client_id = %client_id, "ws_client_evicted");
            }
        }
        debug!(
            target: "scada.realtime",
            clients = state.clients.len(),
            evicted = evicted.len(),
            "ws_heartbeat"
        );
        evicted
    }

    /// 启动心跳任务；已启动时不重复启动。任务只持有弱引用。
    pub async fn start_heartbeat(self: &Arc<Self>, interval: Duration) {
        let mut heartbeat = self.heartbeat.lock().await;
        if heartbeat.is_some() {
            return;
        }
        let hub: Weak<Self> = Arc::downgrade(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(hub) = hub.upgrade() else {
                    break;
                };
                hub.heartbeat_tick().await;
            }
        });
        *heartbeat = Some(HeartbeatTask { cancel, task });
    }

    /// 停止心跳，以 1000 关闭全部连接并清空索引。未启动过也可调用。
    pub async fn shutdown(&self) {
        if let Some(heartbeat) = self.heartbeat.lock().await.take() {
            heartbeat.cancel.cancel();
            let _ = heartbeat.task.await;
        }
        let mut state = self.state.write().await;
        let count = state.clients.len();
        for client in state.clients.values() {
            let _ = client.sender.send(HubMessage::Close {
                code: CLOSE_NORMAL,
                reason: "server shutdown".to_string(),
            });
        }
        state.clients.clear();
        state.projects.clear();
        info!(target: "scada.realtime", count, "ws_hub_shutdown");
    }

    pub(crate) async fn send_error(&self, client_id: &str, message: impl Into<String>) {
        self.send_to(client_id, &OutboundFrame::error(message)).await;
    }
}

#[async_trait]
impl Broadcaster for RealtimeHub {
    async fn broadcast(&self, project_id: &str, frame: OutboundFrame) -> usize {
        self.broadcast_frame(project_id, &frame).await
    }
}
