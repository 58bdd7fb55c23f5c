//! 实时中心回调的服务端实现：把订阅快照、告警确认与查询接到采集注册表和告警评估器上。

use api_contract::{FrameType, OutboundFrame};
use async_trait::async_trait;
use domain::Identity;
use scada_alarm::{AlarmError, AlarmEvaluator};
use scada_collector::CollectorRegistry;
use scada_realtime::{CallbackError, HubCallbacks};
use serde_json::json;
use std::sync::Arc;

pub struct ScadaBridge {
    registry: CollectorRegistry,
    evaluator: Arc<AlarmEvaluator>,
}

impl ScadaBridge {
    pub fn new(registry: CollectorRegistry, evaluator: Arc<AlarmEvaluator>) -> Self {
        Self {
            registry,
            evaluator,
        }
    }

    fn current_data(&self, project_id: &str, diagram_id: Option<&str>) -> OutboundFrame {
        let values = self.registry.current_values(project_id);
        let data = match diagram_id {
            Some(diagram_id) => json!({ "diagramId": diagram_id, "values": values }),
            None => json!({ "values": values }),
        };
        OutboundFrame::for_project(FrameType::CurrentData, project_id, data)
    }
}

fn alarm_callback_error(err: AlarmError) -> CallbackError {
    match err {
        AlarmError::RuleNotFound(_) | AlarmError::NotActive(_) => {
            CallbackError::Rejected(err.to_string())
        }
        AlarmError::Storage(_) => CallbackError::Internal(err.to_string()),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, CallbackError> {
    serde_json::to_value(value).map_err(|err| CallbackError::Internal(err.to_string()))
}

#[async_trait]
impl HubCallbacks for ScadaBridge {
    async fn on_subscribe(
        &self,
        _identity: &Identity,
        project_id: &str,
    ) -> Result<Vec<OutboundFrame>, CallbackError> {
        let project_ids = [project_id.to_string()];
        let active = self
            .evaluator
            .active_alarms(&project_ids)
            .await
            .map_err(alarm_callback_error)?;
        let summary = self
            .evaluator
            .summary(project_id)
            .await
            .map_err(alarm_callback_error)?;
        Ok(vec![
            self.current_data(project_id, None),
            OutboundFrame::for_project(FrameType::ActiveAlarms, project_id, to_value(&active)?),
            OutboundFrame::for_project(FrameType::AlarmSummary, project_id, to_value(&summary)?),
        ])
    }

    async fn acknowledge_alarm(
        &self,
        identity: &Identity,
        alarm_id: &str,
        message: Option<String>,
    ) -> Result<(), CallbackError> {
        self.evaluator
            .acknowledge(alarm_id, &identity.display_name, message)
            .await
            .map(|_| ())
            .map_err(alarm_callback_error)
    }

    async fn active_alarms(&self, project_ids: &[String]) -> Result<OutboundFrame, CallbackError> {
        let active = self
            .evaluator
            .active_alarms(project_ids)
            .await
            .map_err(alarm_callback_error)?;
        Ok(OutboundFrame::new(FrameType::ActiveAlarms, to_value(&active)?))
    }

    async fn diagram_realtime(
        &self,
        project_id: &str,
        diagram_id: Option<&str>,
    ) -> Result<OutboundFrame, CallbackError> {
        Ok(self.current_data(project_id, diagram_id))
    }
}

#[cfg(test)]
mod tests {
    use super::ScadaBridge;
    use api_contract::{FrameType, NoopBroadcaster};
    use domain::{AlarmCondition, AlarmSeverity, Identity};
    use scada_alarm::AlarmEvaluator;
    use scada_collector::{CollectorConfig, CollectorRegistry};
    use scada_protocol::AdapterSet;
    use scada_realtime::{CallbackError, HubCallbacks};
    use scada_storage::{
        AlarmRuleRecord, InMemoryAlarmStore, InMemoryDeviceStore, InMemoryMeasurementStore,
    };
    use std::sync::Arc;

    fn bridge_with_rule() -> (ScadaBridge, Arc<AlarmEvaluator>) {
        let alarms = Arc::new(InMemoryAlarmStore::new());
        alarms
            .upsert_rule(AlarmRuleRecord {
                rule_id: "rule-1".to_string(),
                project_id: "p-1".to_string(),
                tag_id: "tag-1".to_string(),
                name: "boiler high".to_string(),
                condition: AlarmCondition::High,
                threshold: 80.0,
                severity: AlarmSeverity::Critical,
                deadband: 0.0,
                delay_ms: 0,
                enabled: true,
            })
            .expect("rule");
        let broadcaster = Arc::new(NoopBroadcaster);
        let evaluator = Arc::new(AlarmEvaluator::new(alarms, broadcaster.clone()));
        let devices = Arc::new(InMemoryDeviceStore::new());
        let registry = CollectorRegistry::new(
            devices.clone(),
            devices,
            Arc::new(InMemoryMeasurementStore::new()),
            AdapterSet::default(),
            evaluator.clone(),
            broadcaster,
            CollectorConfig::default(),
        );
        (ScadaBridge::new(registry, evaluator.clone()), evaluator)
    }

    fn operator() -> Identity {
        Identity::new("u-1", "Operator", Vec::new())
    }

    #[tokio::test]
    async fn subscribe_snapshot_has_three_frames() {
        let (bridge, evaluator) = bridge_with_rule();
        evaluator
            .evaluate("p-1", "tag-1", 95.0, 1)
            .await
            .expect("evaluate");

        let frames = bridge.on_subscribe(&operator(), "p-1").await.expect("frames");
        let types: Vec<_> = frames.iter().map(|frame| frame.frame_type).collect();
        assert_eq!(
            types,
            vec![
                FrameType::CurrentData,
                FrameType::ActiveAlarms,
                FrameType::AlarmSummary
            ]
        );
        assert_eq!(frames[1].data[0]["ruleId"], "rule-1");
        assert_eq!(frames[2].data["totalActive"], 1);
        assert!(frames.iter().all(|frame| frame.project_id.as_deref() == Some("p-1")));
    }

    #[tokio::test]
    async fn acknowledge_records_display_name() {
        let (bridge, evaluator) = bridge_with_rule();

        let err = bridge
            .acknowledge_alarm(&operator(), "rule-1", None)
            .await
            .expect_err("not active");
        assert!(matches!(err, CallbackError::Rejected(_)));
        let err = bridge
            .acknowledge_alarm(&operator(), "missing", None)
            .await
            .expect_err("missing");
        assert!(matches!(err, CallbackError::Rejected(_)));

        evaluator
            .evaluate("p-1", "tag-1", 95.0, 1)
            .await
            .expect("evaluate");
        bridge
            .acknowledge_alarm(&operator(), "rule-1", Some("on it".to_string()))
            .await
            .expect("ack");
        let active = evaluator
            .active_alarms(&["p-1".to_string()])
            .await
            .expect("active");
        assert_eq!(active[0].acknowledged_by.as_deref(), Some("Operator"));
    }

    #[tokio::test]
    async fn diagram_realtime_echoes_diagram_id() {
        let (bridge, _) = bridge_with_rule();
        let frame = bridge
            .diagram_realtime("p-1", Some("diagram-9"))
            .await
            .expect("frame");
        assert_eq!(frame.frame_type, FrameType::CurrentData);
        assert_eq!(frame.data["diagramId"], "diagram-9");
        assert_eq!(frame.data["values"], serde_json::json!([]));
    }
}
