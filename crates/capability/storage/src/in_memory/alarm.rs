//! 告警规则、状态与事件内存实现

use crate::error::StorageError;
use crate::models::{AlarmEventRecord, AlarmRuleRecord, AlarmStateRecord};
use crate::traits::AlarmStore;
use std::collections::HashMap;
use std::sync::RwLock;

/// 告警内存存储
pub struct InMemoryAlarmStore {
    rules: RwLock<HashMap<String, AlarmRuleRecord>>,
    states: RwLock<HashMap<String, AlarmStateRecord>>,
    events: RwLock<Vec<AlarmEventRecord>>,
}

impl InMemoryAlarmStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
        }
    }

    pub fn upsert_rule(&self, rule: AlarmRuleRecord) -> Result<(), StorageError> {
        let mut map = self
            .rules
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(rule.rule_id.clone(), rule);
        Ok(())
    }

    /// 全部事件数量（用于测试）
    pub fn event_count(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }
}

impl Default for InMemoryAlarmStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_rules(mut rules: Vec<AlarmRuleRecord>) -> Vec<AlarmRuleRecord> {
    rules.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
    rules
}

#[async_trait::async_trait]
impl AlarmStore for InMemoryAlarmStore {
    async fn list_rules_for_tag(
        &self,
        tag_id: &str,
    ) -> Result<Vec<AlarmRuleRecord>, StorageError> {
        let map = self
            .rules
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(sorted_rules(
            map.values()
                .filter(|rule| rule.tag_id == tag_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_rules_by_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<AlarmRuleRecord>, StorageError> {
        let map = self
            .rules
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(sorted_rules(
            map.values()
                .filter(|rule| rule.project_id == project_id)
                .cloned()
                .collect(),
        ))
    }

    async fn find_rule(&self, rule_id: &str) -> Result<Option<AlarmRuleRecord>, StorageError> {
        let map = self
            .rules
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(rule_id).cloned())
    }

    async fn find_state(&self, rule_id: &str) -> Result<Option<AlarmStateRecord>, StorageError> {
        let map = self
            .states
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(rule_id).cloned())
    }

    async fn upsert_state(&self, state: &AlarmStateRecord) -> Result<(), StorageError> {
        let mut map = self
            .states
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(state.rule_id.clone(), state.clone());
        Ok(())
    }

    async fn append_event(&self, event: &AlarmEventRecord) -> Result<(), StorageError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, rule_id: &str) -> Result<Vec<AlarmEventRecord>, StorageError> {
        let events = self
            .events
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(events
            .iter()
            .filter(|event| event.rule_id == rule_id)
            .cloned()
            .collect())
    }
}
