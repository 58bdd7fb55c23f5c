//! 告警评估：按规则维护 normal / triggered 状态，状态翻转时写事件并推送。

mod rule;

use api_contract::{Broadcaster, FrameType, OutboundFrame};
use domain::{
    AlarmClassification, AlarmCondition, AlarmEventKind, AlarmSeverity, now_epoch_ms,
};
use scada_storage::{AlarmEventRecord, AlarmRuleRecord, AlarmStateRecord, AlarmStore, StorageError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use rule::{Decision, condition_cleared, condition_matches, effective_limit, next_state};

/// 告警错误。
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("alarm rule not found: {0}")]
    RuleNotFound(String),
    #[error("alarm not active: {0}")]
    NotActive(String),
}

impl From<StorageError> for AlarmError {
    fn from(err: StorageError) -> Self {
        AlarmError::Storage(err.to_string())
    }
}

/// 当前处于触发状态的告警
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlarm {
    pub rule_id: String,
    pub rule_name: String,
    pub project_id: String,
    pub tag_id: String,
    pub condition: AlarmCondition,
    pub threshold: f64,
    pub severity: AlarmSeverity,
    pub value: Option<f64>,
    pub triggered_at_ms: Option<i64>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub warning: usize,
    pub critical: usize,
}

/// 项目告警汇总
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmSummary {
    pub project_id: String,
    pub total_active: usize,
    pub acknowledged: usize,
    pub unacknowledged: usize,
    pub by_severity: SeverityCounts,
}

/// 告警评估器
///
/// 状态缓存由一把锁保护；状态持久化与广播都在锁内完成，同一规则的事件顺序与广播顺序一致。
pub struct AlarmEvaluator {
    store: Arc<dyn AlarmStore>,
    broadcaster: Arc<dyn Broadcaster>,
    states: Mutex<HashMap<String, AlarmStateRecord>>,
}

impl AlarmEvaluator {
    pub fn new(store: Arc<dyn AlarmStore>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            store,
            broadcaster,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// 用一个已接受的测量值评估该点位的全部启用规则，返回产生的事件。
    ///
    /// 单条规则失败只记录日志，不影响其他规则。
    pub async fn evaluate(
        &self,
        project_id: &str,
        tag_id: &str,
        value: f64,
        ts_ms: i64,
    ) -> Result<Vec<AlarmEventRecord>, AlarmError> {
        let rules = self.store.list_rules_for_tag(tag_id).await?;
        let mut events = Vec::new();
        for rule in rules
            .iter()
            .filter(|rule| rule.enabled && rule.project_id == project_id)
        {
            match self.evaluate_rule(rule, value, ts_ms).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        target: "scada.alarm",
                        rule_id = %rule.rule_id,
                        tag_id,
                        error = %err,
                        "alarm_evaluate_failed"
                    );
                }
            }
        }
        Ok(events)
    }

    async fn evaluate_rule(
        &self,
        rule: &AlarmRuleRecord,
        value: f64,
        ts_ms: i64,
    ) -> Result<Option<AlarmEventRecord>, AlarmError> {
        let mut states = self.states.lock().await;
        let current = self.load_state(&states, &rule.rule_id, ts_ms).await?;
        let decision = next_state(rule, &current, value, ts_ms);

        let event = match decision.transition {
            Some(kind) => {
                let event = new_event(rule, kind, Some(value), None, None, ts_ms);
                self.store.append_event(&event).await?;
                Some(event)
            }
            None => None,
        };
        // 事件已落库时状态必须同步进缓存，否则下一次读数会重复触发
        if let Err(err) = self.store.upsert_state(&decision.state).await {
            warn!(
                target: "scada.alarm",
                rule_id = %rule.rule_id,
                error = %err,
                "alarm_state_persist_failed"
            );
        }
        states.insert(rule.rule_id.clone(), decision.state);

        if let Some(event) = &event {
            let frame_type = match event.kind {
                AlarmEventKind::Triggered => {
                    scada_telemetry::record_alarm_triggered();
                    FrameType::AlarmTriggered
                }
                _ => {
                    scada_telemetry::record_alarm_cleared();
                    FrameType::AlarmCleared
                }
            };
            info!(
                target: "scada.alarm",
                rule_id = %rule.rule_id,
                project_id = %rule.project_id,
                kind = event.kind.as_str(),
                value,
                threshold = rule.threshold,
                "alarm_transition"
            );
            self.broadcaster
                .broadcast(&rule.project_id, event_frame(rule, event, frame_type))
                .await;
        }
        Ok(event)
    }

    /// 确认告警：只允许对触发中的规则操作，不改变分类。
    pub async fn acknowledge(
        &self,
        rule_id: &str,
        acknowledged_by: &str,
        message: Option<String>,
    ) -> Result<AlarmEventRecord, AlarmError> {
        let rule = self
            .store
            .find_rule(rule_id)
            .await?
            .ok_or_else(|| AlarmError::RuleNotFound(rule_id.to_string()))?;

        let mut states = self.states.lock().await;
        let now_ms = now_epoch_ms();
        let mut state = self.load_state(&states, rule_id, now_ms).await?;
        if state.classification != AlarmClassification::Triggered {
            return Err(AlarmError::NotActive(rule_id.to_string()));
        }
        state.acknowledged = true;
        state.acknowledged_by = Some(acknowledged_by.to_string());
        state.updated_at_ms = now_ms;

        let event = new_event(
            &rule,
            AlarmEventKind::Acknowledged,
            state.last_value,
            Some(acknowledged_by.to_string()),
            message,
            now_ms,
        );
        self.store.append_event(&event).await?;
        if let Err(err) = self.store.upsert_state(&state).await {
            warn!(target: "scada.alarm", rule_id, error = %err, "alarm_state_persist_failed");
        }
        states.insert(rule_id.to_string(), state);

        scada_telemetry::record_alarm_acknowledged();
        info!(
            target: "scada.alarm",
            rule_id,
            project_id = %rule.project_id,
            acknowledged_by,
            "alarm_acknowledged"
        );
        self.broadcaster
            .broadcast(
                &rule.project_id,
                event_frame(&rule, &event, FrameType::AlarmAcknowledged),
            )
            .await;
        Ok(event)
    }

    /// 指定项目下当前触发中的告警（级别从高到低，同级按触发时间）。
    pub async fn active_alarms(
        &self,
        project_ids: &[String],
    ) -> Result<Vec<ActiveAlarm>, AlarmError> {
        let mut active = Vec::new();
        for project_id in project_ids {
            let rules = self.store.list_rules_by_project(project_id).await?;
            for rule in rules.into_iter().filter(|rule| rule.enabled) {
                let cached = self.states.lock().await.get(&rule.rule_id).cloned();
                let state = match cached {
                    Some(state) => Some(state),
                    None => self.store.find_state(&rule.rule_id).await?,
                };
                let Some(state) = state else {
                    continue;
                };
                if state.classification != AlarmClassification::Triggered {
                    continue;
                }
                active.push(ActiveAlarm {
                    rule_id: rule.rule_id,
                    rule_name: rule.name,
                    project_id: rule.project_id,
                    tag_id: rule.tag_id,
                    condition: rule.condition,
                    threshold: rule.threshold,
                    severity: rule.severity,
                    value: state.last_value,
                    triggered_at_ms: state.triggered_at_ms,
                    acknowledged: state.acknowledged,
                    acknowledged_by: state.acknowledged_by,
                });
            }
        }
        active.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.triggered_at_ms.cmp(&b.triggered_at_ms))
        });
        Ok(active)
    }

    pub async fn summary(&self, project_id: &str) -> Result<AlarmSummary, AlarmError> {
        let active = self.active_alarms(&[project_id.to_string()]).await?;
        let mut by_severity = SeverityCounts::default();
        let mut acknowledged = 0;
        for alarm in &active {
            match alarm.severity {
                AlarmSeverity::Info => by_severity.info += 1,
                AlarmSeverity::Warning => by_severity.warning += 1,
                AlarmSeverity::Critical => by_severity.critical += 1,
            }
            if alarm.acknowledged {
                acknowledged += 1;
            }
        }
        Ok(AlarmSummary {
            project_id: project_id.to_string(),
            total_active: active.len(),
            acknowledged,
            unacknowledged: active.len() - acknowledged,
            by_severity,
        })
    }

    async fn load_state(
        &self,
        states: &HashMap<String, AlarmStateRecord>,
        rule_id: &str,
        now_ms: i64,
    ) -> Result<AlarmStateRecord, AlarmError> {
        if let Some(state) = states.get(rule_id) {
            return Ok(state.clone());
        }
        Ok(self
            .store
            .find_state(rule_id)
            .await?
            .unwrap_or_else(|| AlarmStateRecord::normal(rule_id, now_ms)))
    }
}

fn new_event(
    rule: &AlarmRuleRecord,
    kind: AlarmEventKind,
    value: Option<f64>,
    acknowledged_by: Option<String>,
    message: Option<String>,
    ts_ms: i64,
) -> AlarmEventRecord {
    AlarmEventRecord {
        event_id: uuid::Uuid::new_v4().to_string(),
        rule_id: rule.rule_id.clone(),
        project_id: rule.project_id.clone(),
        tag_id: rule.tag_id.clone(),
        kind,
        value,
        threshold: rule.threshold,
        severity: rule.severity,
        acknowledged_by,
        message,
        ts_ms,
    }
}

fn event_frame(
    rule: &AlarmRuleRecord,
    event: &AlarmEventRecord,
    frame_type: FrameType,
) -> OutboundFrame {
    OutboundFrame::for_project(
        frame_type,
        rule.project_id.clone(),
        serde_json::json!({
            "eventId": event.event_id,
            "ruleId": rule.rule_id,
            "ruleName": rule.name,
            "tagId": rule.tag_id,
            "condition": rule.condition,
            "threshold": rule.threshold,
            "severity": rule.severity,
            "value": event.value,
            "acknowledgedBy": event.acknowledged_by,
            "message": event.message,
            "timestamp": event.ts_ms,
        }),
    )
}
