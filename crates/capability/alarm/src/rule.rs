//! 单条规则的状态转移（纯函数，不涉及存储与广播）。

use domain::{AlarmClassification, AlarmCondition, AlarmEventKind};
use scada_storage::{AlarmRuleRecord, AlarmStateRecord};

/// 条件的实际比较限值：high_high / low_low 在阈值上放大 / 缩小 10%。
pub fn effective_limit(condition: AlarmCondition, threshold: f64) -> f64 {
    match condition {
        AlarmCondition::High | AlarmCondition::Low => threshold,
        AlarmCondition::HighHigh => threshold * 1.1,
        AlarmCondition::LowLow => threshold * 0.9,
    }
}

pub fn condition_matches(condition: AlarmCondition, threshold: f64, value: f64) -> bool {
    let limit = effective_limit(condition, threshold);
    match condition {
        AlarmCondition::High | AlarmCondition::HighHigh => value > limit,
        AlarmCondition::Low | AlarmCondition::LowLow => value < limit,
    }
}

/// 已触发规则是否恢复。死区只作用于恢复方向。
pub fn condition_cleared(rule: &AlarmRuleRecord, value: f64) -> bool {
    let limit = effective_limit(rule.condition, rule.threshold);
    let deadband = rule.deadband.max(0.0);
    match rule.condition {
        AlarmCondition::High | AlarmCondition::HighHigh => value <= limit - deadband,
        AlarmCondition::Low | AlarmCondition::LowLow => value >= limit + deadband,
    }
}

/// 一次评估的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub state: AlarmStateRecord,
    pub transition: Option<AlarmEventKind>,
}

/// 计算下一状态。`ts_ms` 为读数时间戳，延时告警按读数时间计算。
pub fn next_state(
    rule: &AlarmRuleRecord,
    current: &AlarmStateRecord,
    value: f64,
    ts_ms: i64,
) -> Decision {
    let mut state = current.clone();
    state.last_value = Some(value);
    state.updated_at_ms = ts_ms;
    let mut transition = None;

    match current.classification {
        AlarmClassification::Normal => {
            if condition_matches(rule.condition, rule.threshold, value) {
                let since = current.pending_since_ms.unwrap_or(ts_ms);
                if ts_ms.saturating_sub(since) >= rule.delay_ms as i64 {
                    state.classification = AlarmClassification::Triggered;
                    state.triggered_at_ms = Some(ts_ms);
                    state.pending_since_ms = None;
                    state.acknowledged = false;
                    state.acknowledged_by = None;
                    transition = Some(AlarmEventKind::Triggered);
                } else {
                    state.pending_since_ms = Some(since);
                }
            } else {
                state.pending_since_ms = None;
            }
        }
        AlarmClassification::Triggered => {
            if condition_cleared(rule, value) {
                state.classification = AlarmClassification::Normal;
                state.triggered_at_ms = None;
                state.pending_since_ms = None;
                state.acknowledged = false;
                state.acknowledged_by = None;
                transition = Some(AlarmEventKind::Cleared);
            }
        }
    }

    Decision { state, transition }
}
