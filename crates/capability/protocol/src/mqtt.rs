//! MQTT 适配器
//!
//! 每个设备一个 broker 会话与一个事件循环任务；同一设备的消息在该任务内顺序处理。
//!
//! ```json
//! // device.connection
//! { "host": "broker.local", "port": 1883, "username": "scada", "password": "***" }
//!
//! // tag.address：主题过滤器，支持 + / # 通配
//! "plant/line1/+/temperature"
//! ```

use crate::error::ProtocolError;
use crate::probe::probe_tcp;
use crate::types::{
    ConnectionState, MqttConnection, ProbeFailure, ProbeResult, ProbeSettings, StateTable,
};
use crate::ProtocolAdapter;
use async_trait::async_trait;
use domain::{TransportKind, now_epoch_ms};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 推送数据处理器（每个订阅一个）
#[async_trait]
pub trait PushHandler: Send + Sync {
    async fn handle(&self, topic: &str, value: f64, received_at_ms: i64);
}

struct Route {
    filter: String,
    handler: Arc<dyn PushHandler>,
}

type Routes = Arc<RwLock<Vec<Route>>>;

struct MqttSession {
    client: AsyncClient,
    routes: Routes,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// MQTT 适配器
pub struct MqttAdapter {
    sessions: Mutex<HashMap<String, MqttSession>>,
    states: Arc<StateTable>,
    probe: ProbeSettings,
}

impl MqttAdapter {
    pub fn new(probe: ProbeSettings) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            states: Arc::new(StateTable::default()),
            probe,
        }
    }

    pub fn parse_connection(params: &serde_json::Value) -> Result<MqttConnection, ProtocolError> {
        serde_json::from_value(params.clone())
            .map_err(|e| ProtocolError::ConfigParse(format!("mqtt connection: {}", e)))
    }

    /// 订阅主题过滤器；消息解析为数值后交给 `handler`。
    pub async fn subscribe(
        &self,
        device_id: &str,
        filter: &str,
        handler: Arc<dyn PushHandler>,
    ) -> Result<(), ProtocolError> {
        let (client, routes) = {
            let sessions = self
                .sessions
                .lock()
                .map_err(|_| ProtocolError::Connection("lock failed".to_string()))?;
            let session = sessions
                .get(device_id)
                .ok_or_else(|| ProtocolError::NotConnected(device_id.to_string()))?;
            (session.client.clone(), session.routes.clone())
        };
        routes
            .write()
            .map_err(|_| ProtocolError::Connection("lock failed".to_string()))?
            .push(Route {
                filter: filter.to_string(),
                handler,
            });
        client
            .subscribe(filter, QoS::AtMostOnce)
            .await
            .map_err(|e| ProtocolError::Mqtt(e.to_string()))?;
        debug!(target: "scada.protocol", device_id, filter, "mqtt_subscribed");
        Ok(())
    }

    fn has_session(&self, device_id: &str) -> Result<bool, ProtocolError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| ProtocolError::Connection("lock failed".to_string()))?;
        Ok(sessions.contains_key(device_id))
    }
}

#[async_trait]
impl ProtocolAdapter for MqttAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Mqtt
    }

    async fn probe(&self, params: &serde_json::Value) -> ProbeResult {
        match Self::parse_connection(params) {
            Ok(config) => probe_tcp(&config.host, config.port, &self.probe).await,
            Err(err) => ProbeResult::failed(ProbeFailure::InvalidConfig, err.to_string()),
        }
    }

    async fn connect(
        &self,
        device_id: &str,
        params: &serde_json::Value,
    ) -> Result<(), ProtocolError> {
        if self.has_session(device_id)? {
            return Ok(());
        }
        let config = Self::parse_connection(params)?;
        self.states.set(device_id, ConnectionState::Connecting);

        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("scada-{}-{}", device_id, now_epoch_ms()));
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        match timeout(self.probe.timeout, wait_conn_ack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.states.set(device_id, ConnectionState::Error);
                return Err(err);
            }
            Err(_) => {
                self.states.set(device_id, ConnectionState::Error);
                return Err(ProtocolError::Timeout(format!(
                    "connect {}:{}",
                    config.host, config.port
                )));
            }
        }
        self.states.set(device_id, ConnectionState::Connected);
        info!(target: "scada.protocol", device_id, host = %config.host, port = config.port, "mqtt_connected");

        let routes: Routes = Arc::new(RwLock::new(Vec::new()));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_event_loop(
            device_id.to_string(),
            client.clone(),
            eventloop,
            routes.clone(),
            self.states.clone(),
            cancel.clone(),
        ));

        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ProtocolError::Connection("lock failed".to_string()))?;
        sessions.insert(
            device_id.to_string(),
            MqttSession {
                client,
                routes,
                cancel,
                task,
            },
        );
        Ok(())
    }

    async fn disconnect(&self, device_id: &str) {
        let session = self
            .sessions
            .lock()
            .ok()
            .and_then(|mut sessions| sessions.remove(device_id));
        if let Some(session) = session {
            let _ = session.client.try_disconnect();
            session.cancel.cancel();
            if let Err(err) = session.task.await {
                warn!(target: "scada.protocol", device_id, error = %err, "mqtt_event_loop_join_failed");
            }
            info!(target: "scada.protocol", device_id, "mqtt_disconnected");
        }
        self.states.set(device_id, ConnectionState::Disconnected);
    }

    fn status(&self, device_id: &str) -> ConnectionState {
        self.states.get(device_id)
    }
}

async fn wait_conn_ack(eventloop: &mut EventLoop) -> Result<(), ProtocolError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(err) => return Err(ProtocolError::Connection(err.to_string())),
        }
    }
}

async fn run_event_loop(
    device_id: String,
    client: AsyncClient,
    mut eventloop: EventLoop,
    routes: Routes,
    states: Arc<StateTable>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };
        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(value) = parse_payload(&publish.payload) else {
                    warn!(
                        target: "scada.protocol",
                        device_id = %device_id,
                        topic = %publish.topic,
                        "mqtt_payload_unparsed"
                    );
                    continue;
                };
                let handlers: Vec<Arc<dyn PushHandler>> = routes
                    .read()
                    .map(|routes| {
                        routes
                            .iter()
                            .filter(|route| topic_matches(&route.filter, &publish.topic))
                            .map(|route| route.handler.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                let received_at_ms = now_epoch_ms();
                for handler in handlers {
                    handler.handle(&publish.topic, value, received_at_ms).await;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // 重连后 broker 不保留会话，重新订阅
                states.set(&device_id, ConnectionState::Connected);
                let filters: Vec<String> = routes
                    .read()
                    .map(|routes| routes.iter().map(|route| route.filter.clone()).collect())
                    .unwrap_or_default();
                for filter in filters {
                    if let Err(err) = client.try_subscribe(filter.as_str(), QoS::AtMostOnce) {
                        warn!(target: "scada.protocol", device_id = %device_id, filter = %filter, error = %err, "mqtt_resubscribe_failed");
                    }
                }
                info!(target: "scada.protocol", device_id = %device_id, "mqtt_reconnected");
            }
            Ok(_) => {}
            Err(err) => {
                states.set(&device_id, ConnectionState::Error);
                warn!(target: "scada.protocol", device_id = %device_id, error = %err, "mqtt_connection_error");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }
}

/// MQTT 主题过滤器匹配（`+` 单层、`#` 多层；通配符不匹配 `$` 开头的系统主题）
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// 解析消息负载：纯数值、true/false、JSON `{"value": n}` 或 `key=value`
pub fn parse_payload(payload: &[u8]) -> Option<f64> {
    let data = std::str::from_utf8(payload).ok()?.trim();

    if let Ok(value) = data.parse::<f64>() {
        return Some(value);
    }

    match data.to_ascii_lowercase().as_str() {
        "true" | "on" => return Some(1.0),
        "false" | "off" => return Some(0.0),
        _ => {}
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
        return match json.get("value") {
            Some(serde_json::Value::Number(number)) => number.as_f64(),
            Some(serde_json::Value::Bool(flag)) => Some(if *flag { 1.0 } else { 0.0 }),
            Some(serde_json::Value::String(text)) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
    }

    for part in data.split(['=', ':', ',']) {
        if let Ok(value) = part.trim().parse::<f64>() {
            return Some(value);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_wildcards() {
        assert!(topic_matches("plant/+/temp", "plant/line1/temp"));
        assert!(!topic_matches("plant/+/temp", "plant/line1/a/temp"));
        assert!(topic_matches("plant/#", "plant/line1/a/temp"));
        assert!(topic_matches("plant/#", "plant"));
        assert!(topic_matches("plant/line1/temp", "plant/line1/temp"));
        assert!(!topic_matches("plant/line1/temp", "plant/line1/pressure"));
        assert!(!topic_matches("plant/line1", "plant/line1/temp"));
        assert!(!topic_matches("#", "$SYS/broker/uptime"));
    }

    #[test]
    fn test_parse_payload_formats() {
        assert_eq!(parse_payload(b"42.5"), Some(42.5));
        assert_eq!(parse_payload(b" 7 \n"), Some(7.0));
        assert_eq!(parse_payload(b"true"), Some(1.0));
        assert_eq!(parse_payload(b"OFF"), Some(0.0));
        assert_eq!(parse_payload(br#"{"value": 12.5, "unit": "C"}"#), Some(12.5));
        assert_eq!(parse_payload(br#"{"value": true}"#), Some(1.0));
        assert_eq!(parse_payload(br#"{"temp": 1}"#), None);
        assert_eq!(parse_payload(b"temp=21.5"), Some(21.5));
        assert_eq!(parse_payload(b"hello"), None);
        assert_eq!(parse_payload(&[0xff, 0xfe]), None);
    }

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        struct Ignore;

        #[async_trait]
        impl PushHandler for Ignore {
            async fn handle(&self, _topic: &str, _value: f64, _received_at_ms: i64) {}
        }

        let adapter = MqttAdapter::new(ProbeSettings::default());
        let err = adapter
            .subscribe("dev-1", "plant/#", Arc::new(Ignore))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected(_)));
        assert_eq!(adapter.status("dev-1"), ConnectionState::Disconnected);
    }
}
