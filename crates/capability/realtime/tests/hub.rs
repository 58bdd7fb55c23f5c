use api_contract::{Broadcaster, FrameType, OutboundFrame};
use async_trait::async_trait;
use domain::Identity;
use scada_auth::{AuthError, JwtManager};
use scada_realtime::{
    CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, CallbackError, ClientReceiver,
    HubCallbacks, HubMessage, RealtimeHub,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SECRET: &str = "test-secret";

fn hub() -> Arc<RealtimeHub> {
    Arc::new(RealtimeHub::new(Arc::new(JwtManager::new(
        SECRET.to_string(),
        3600,
    ))))
}

fn operator() -> Identity {
    Identity::new("user-1", "Operator", vec!["operator".to_string()])
}

fn drain(rx: &mut ClientReceiver) -> Vec<HubMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn frame_types(messages: &[HubMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|message| match message {
            HubMessage::Text(text) => serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|value| value["type"].as_str().map(str::to_string)),
            _ => None,
        })
        .collect()
}

fn measurement(project_id: &str) -> OutboundFrame {
    OutboundFrame::for_project(
        FrameType::Measurement,
        project_id,
        serde_json::json!({ "tagId": "tag-1", "value": 1.5 }),
    )
}

#[derive(Default)]
struct FakeCallbacks {
    acknowledged: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl HubCallbacks for FakeCallbacks {
    async fn on_subscribe(
        &self,
        _identity: &Identity,
        project_id: &str,
    ) -> Result<Vec<OutboundFrame>, CallbackError> {
        Ok(vec![OutboundFrame::for_project(
            FrameType::CurrentData,
            project_id,
            serde_json::json!([]),
        )])
    }

    async fn acknowledge_alarm(
        &self,
        identity: &Identity,
        alarm_id: &str,
        _message: Option<String>,
    ) -> Result<(), CallbackError> {
        if alarm_id == "missing" {
            return Err(CallbackError::Rejected("alarm rule not found: missing".to_string()));
        }
        self.acknowledged
            .lock()
            .expect("lock")
            .push((identity.user_id.clone(), alarm_id.to_string()));
        Ok(())
    }

    async fn active_alarms(&self, project_ids: &[String]) -> Result<OutboundFrame, CallbackError> {
        Ok(OutboundFrame::new(
            FrameType::ActiveAlarms,
            serde_json::json!({ "projects": project_ids }),
        ))
    }

    async fn diagram_realtime(
        &self,
        project_id: &str,
        _diagram_id: Option<&str>,
    ) -> Result<OutboundFrame, CallbackError> {
        Ok(OutboundFrame::for_project(
            FrameType::CurrentData,
            project_id,
            serde_json::json!([]),
        ))
    }
}

#[tokio::test]
async fn handshake_rejects_bad_tokens() {
    let hub = hub();

    let err = hub.authenticate(None).expect_err("missing");
    assert_eq!(err.0, AuthError::TokenMissing);
    assert_eq!(err.close_code(), CLOSE_POLICY_VIOLATION);
    let err = hub.authenticate(Some("not-a-jwt")).expect_err("garbage");
    assert_eq!(err.0, AuthError::TokenInvalid);
    let other = JwtManager::new("other-secret".to_string(), 3600)
        .issue_access_token(&operator())
        .expect("token");
    assert!(hub.authenticate(Some(&other)).is_err());
    assert_eq!(hub.client_count().await, 0);

    let token = JwtManager::new(SECRET.to_string(), 3600)
        .issue_access_token(&operator())
        .expect("token");
    let identity = hub.authenticate(Some(&token)).expect("valid");
    assert_eq!(identity.user_id, "user-1");
}

#[tokio::test]
async fn register_sends_connected_frame() {
    let hub = hub();
    let (_client_id, mut rx) = hub.register(operator()).await;
    assert_eq!(frame_types(&drain(&mut rx)), vec!["connected"]);
    assert_eq!(hub.client_count().await, 1);
}

#[tokio::test]
async fn broadcasts_are_isolated_by_project() {
    let hub = hub();
    let (seven, mut seven_rx) = hub.register(operator()).await;
    let (eight, mut eight_rx) = hub.register(operator()).await;
    assert!(hub.subscribe(&seven, "7").await);
    assert!(hub.subscribe(&eight, "8").await);
    drain(&mut seven_rx);
    drain(&mut eight_rx);

    assert_eq!(hub.broadcast("7", measurement("7")).await, 1);

    assert_eq!(frame_types(&drain(&mut seven_rx)), vec!["measurement"]);
    assert!(drain(&mut eight_rx).is_empty());
}

#[tokio::test]
async fn closed_client_does_not_affect_others() {
    let hub = hub();
    let mut receivers = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let (client_id, rx) = hub.register(operator()).await;
        hub.subscribe(&client_id, "7").await;
        ids.push(client_id);
        receivers.push(rx);
    }
    assert_eq!(hub.broadcast("7", measurement("7")).await, 3);

    let closed = receivers.remove(0);
    drop(closed);

    assert_eq!(hub.broadcast("7", measurement("7")).await, 2);
    let subscribers = hub.subscribers("7").await;
    assert_eq!(subscribers.len(), 2);
    assert!(!subscribers.contains(&ids[0]));
    assert_eq!(hub.client_count().await, 2);
    assert_eq!(hub.broadcast("7", measurement("7")).await, 2);
    for rx in receivers.iter_mut() {
        assert_eq!(
            frame_types(&drain(rx)),
            vec!["connected", "measurement", "measurement", "measurement"]
        );
    }
}

#[tokio::test]
async fn unsubscribe_and_unregister_update_both_indices() {
    let hub = hub();
    let (client_id, _rx) = hub.register(operator()).await;
    hub.subscribe(&client_id, "7").await;
    hub.subscribe(&client_id, "8").await;
    assert_eq!(hub.subscriptions(&client_id).await, vec!["7", "8"]);

    assert!(hub.unsubscribe(&client_id, "7").await);
    assert!(hub.subscribers("7").await.is_empty());
    assert_eq!(hub.subscriptions(&client_id).await, vec!["8"]);

    assert!(hub.unregister(&client_id).await);
    assert!(hub.subscribers("8").await.is_empty());
    assert!(!hub.subscribe(&client_id, "9").await);
    assert!(hub.subscribers("9").await.is_empty());
}

#[tokio::test]
async fn silent_client_is_evicted_after_two_missed_pings() {
    let hub = hub();
    let (silent, mut silent_rx) = hub.register(operator()).await;
    let (active, _active_rx) = hub.register(operator()).await;
    hub.subscribe(&silent, "7").await;
    hub.subscribe(&active, "7").await;

    assert!(hub.heartbeat_tick().await.is_empty());
    hub.mark_alive(&active).await;
    assert!(hub.heartbeat_tick().await.is_empty());
    hub.mark_alive(&active).await;

    let evicted = hub.heartbeat_tick().await;
    assert_eq!(evicted, vec![silent.clone()]);
    assert_eq!(hub.client_count().await, 1);
    assert_eq!(hub.subscribers("7").await, vec![active]);
    assert!(hub.identity(&silent).await.is_none());

    let messages = drain(&mut silent_rx);
    assert_eq!(
        messages.iter().filter(|m| **m == HubMessage::Ping).count(),
        2
    );
    assert!(matches!(
        messages.last(),
        Some(HubMessage::Close { code, .. }) if *code == CLOSE_GOING_AWAY
    ));
}

#[tokio::test]
async fn heartbeat_task_runs_on_interval() {
    let hub = hub();
    let (_client_id, _rx) = hub.register(operator()).await;
    hub.start_heartbeat(Duration::from_millis(10)).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hub.client_count().await, 0);
    hub.shutdown().await;
}

#[tokio::test]
async fn inbound_messages_are_dispatched() {
    let hub = hub();
    let callbacks = FakeCallbacks::default();
    let (client_id, mut rx) = hub.register(operator()).await;
    drain(&mut rx);

    hub.handle_inbound(&client_id, r#"{"type":"ping"}"#, &callbacks)
        .await;
    assert_eq!(frame_types(&drain(&mut rx)), vec!["pong"]);

    hub.handle_inbound(&client_id, r#"{"type":"subscribe_project","projectId":7}"#, &callbacks)
        .await;
    assert_eq!(frame_types(&drain(&mut rx)), vec!["subscribed", "current_data"]);
    assert_eq!(hub.subscribers("7").await, vec![client_id.clone()]);

    hub.handle_inbound(&client_id, r#"{"type":"get_active_alarms"}"#, &callbacks)
        .await;
    let messages = drain(&mut rx);
    let HubMessage::Text(text) = &messages[0] else {
        panic!("expected text frame");
    };
    let value: serde_json::Value = serde_json::from_str(text).expect("json");
    assert_eq!(value["type"], "active_alarms");
    assert_eq!(value["data"]["projects"], serde_json::json!(["7"]));

    hub.handle_inbound(
        &client_id,
        r#"{"type":"acknowledge_alarm","alarmId":"rule-1"}"#,
        &callbacks,
    )
    .await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(
        callbacks.acknowledged.lock().expect("lock").clone(),
        vec![("user-1".to_string(), "rule-1".to_string())]
    );

    hub.handle_inbound(
        &client_id,
        r#"{"type":"acknowledge_alarm","alarmId":"missing"}"#,
        &callbacks,
    )
    .await;
    assert_eq!(frame_types(&drain(&mut rx)), vec!["error"]);

    hub.handle_inbound(&client_id, r#"{"type":"unsubscribe_project","projectId":"7"}"#, &callbacks)
        .await;
    assert_eq!(frame_types(&drain(&mut rx)), vec!["unsubscribed"]);
    assert!(hub.subscribers("7").await.is_empty());
}

#[tokio::test]
async fn unknown_and_malformed_frames_are_ignored() {
    let hub = hub();
    let callbacks = FakeCallbacks::default();
    let (client_id, mut rx) = hub.register(operator()).await;
    drain(&mut rx);

    hub.handle_inbound(&client_id, r#"{"type":"reboot_plc"}"#, &callbacks)
        .await;
    hub.handle_inbound(&client_id, "{{{", &callbacks).await;

    assert!(drain(&mut rx).is_empty());
    assert_eq!(hub.client_count().await, 1);
}

#[tokio::test]
async fn diagram_request_without_project_reports_error() {
    let hub = hub();
    let callbacks = FakeCallbacks::default();
    let (client_id, mut rx) = hub.register(operator()).await;
    drain(&mut rx);

    hub.handle_inbound(&client_id, r#"{"type":"get_diagram_realtime"}"#, &callbacks)
        .await;
    assert_eq!(frame_types(&drain(&mut rx)), vec!["error"]);

    hub.handle_inbound(
        &client_id,
        r#"{"type":"get_diagram_realtime","projectId":"7","diagramId":3}"#,
        &callbacks,
    )
    .await;
    assert_eq!(frame_types(&drain(&mut rx)), vec!["current_data"]);
}

#[tokio::test]
async fn shutdown_closes_everything() {
    let idle = hub();
    idle.shutdown().await;

    let hub = hub();
    let (client_id, mut rx) = hub.register(operator()).await;
    hub.subscribe(&client_id, "7").await;
    hub.start_heartbeat(Duration::from_secs(30)).await;

    hub.shutdown().await;

    assert_eq!(hub.client_count().await, 0);
    assert!(hub.subscribers("7").await.is_empty());
    assert!(matches!(
        drain(&mut rx).last(),
        Some(HubMessage::Close { code, .. }) if *code == CLOSE_NORMAL
    ));
    assert_eq!(hub.broadcast("7", measurement("7")).await, 0);
}
