//! 入站消息分发。未知类型与格式错误只记录并忽略。

use api_contract::{FrameError, FrameType, InboundMessage, OutboundFrame, parse_inbound};
use tracing::{debug, warn};

use crate::callbacks::HubCallbacks;
use crate::hub::RealtimeHub;

impl RealtimeHub {
    pub async fn handle_inbound(&self, client_id: &str, text: &str, callbacks: &dyn HubCallbacks) {
        let message = match parse_inbound(text) {
            Ok(message) => message,
            Err(FrameError::UnknownType(kind)) => {
                scada_telemetry::record_inbound_ignored();
                warn!(target: "scada.realtime", client_id, kind = %kind, "inbound_unknown_type");
                return;
            }
            Err(FrameError::Malformed(reason)) => {
                scada_telemetry::record_inbound_ignored();
                warn!(target: "scada.realtime", client_id, reason = %reason, "inbound_malformed");
                return;
            }
        };
        let Some(identity) = self.identity(client_id).await else {
            return;
        };
        self.mark_alive(client_id).await;

        match message {
            InboundMessage::Ping => {
                self.send_to(client_id, &OutboundFrame::new(FrameType::Pong, serde_json::Value::Null))
                    .await;
            }
            InboundMessage::SubscribeProject { project_id } => {
                if !self.subscribe(client_id, &project_id).await {
                    return;
                }
                let ack = OutboundFrame::for_project(
                    FrameType::Subscribed,
                    project_id.clone(),
                    serde_json::json!({ "projectId": project_id }),
                );
                self.send_to(client_id, &ack).await;
                match callbacks.on_subscribe(&identity, &project_id).await {
                    Ok(frames) => {
                        for frame in &frames {
                            self.send_to(client_id, frame).await;
                        }
                    }
                    Err(err) => self.send_error(client_id, err.to_string()).await,
                }
            }
            InboundMessage::UnsubscribeProject { project_id } => {
                self.unsubscribe(client_id, &project_id).await;
                let ack = OutboundFrame::for_project(
                    FrameType::Unsubscribed,
                    project_id.clone(),
                    serde_json::json!({ "projectId": project_id }),
                );
                self.send_to(client_id, &ack).await;
            }
            InboundMessage::AcknowledgeAlarm { alarm_id, message } => {
                // 成功时由告警评估器向项目广播 alarm_acknowledged
                if let Err(err) = callbacks
                    .acknowledge_alarm(&identity, &alarm_id, message)
                    .await
                {
                    self.send_error(client_id, err.to_string()).await;
                }
            }
            InboundMessage::GetActiveAlarms { project_id } => {
                let project_ids = match project_id {
                    Some(project_id) => vec![project_id],
                    None => self.subscriptions(client_id).await,
                };
                match callbacks.active_alarms(&project_ids).await {
                    Ok(frame) => {
                        self.send_to(client_id, &frame).await;
                    }
                    Err(err) => self.send_error(client_id, err.to_string()).await,
                }
            }
            InboundMessage::GetDiagramRealtime {
                project_id,
                diagram_id,
            } => {
                let project_id = match project_id {
                    Some(project_id) => Some(project_id),
                    None => self.subscriptions(client_id).await.into_iter().next(),
                };
                let Some(project_id) = project_id else {
                    self.send_error(client_id, "projectId required").await;
                    return;
                };
                match callbacks
                    .diagram_realtime(&project_id, diagram_id.as_deref())
                    .await
                {
                    Ok(frame) => {
                        self.send_to(client_id, &frame).await;
                    }
                    Err(err) => self.send_error(client_id, err.to_string()).await,
                }
            }
        }
        debug!(target: "scada.realtime", client_id, "inbound_handled");
    }
}
