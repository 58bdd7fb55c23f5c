//! Postgres 告警规则、状态与事件存储实现

use crate::error::StorageError;
use crate::models::{AlarmEventRecord, AlarmRuleRecord, AlarmStateRecord};
use crate::traits::AlarmStore;
use domain::{AlarmClassification, AlarmCondition, AlarmEventKind, AlarmSeverity};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const RULE_COLUMNS: &str =
    "rule_id, project_id, tag_id, name, condition, threshold, severity, deadband, delay_ms, enabled";
const STATE_COLUMNS: &str = "rule_id, classification, last_value, acknowledged, acknowledged_by, \
     triggered_at_ms, pending_since_ms, updated_at_ms";

pub struct PgAlarmStore {
    pub pool: PgPool,
}

impl PgAlarmStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_rules(
        &self,
        filter_column: &str,
        value: &str,
    ) -> Result<Vec<AlarmRuleRecord>, StorageError> {
        let sql =
            format!("select {RULE_COLUMNS} from alarm_rules where {filter_column} = $1 order by rule_id");
        let rows = sqlx::query(&sql).bind(value).fetch_all(&self.pool).await?;
        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            rules.push(rule_from_row(&row)?);
        }
        Ok(rules)
    }
}

fn rule_from_row(row: &PgRow) -> Result<AlarmRuleRecord, StorageError> {
    let condition: String = row.try_get("condition")?;
    let severity: String = row.try_get("severity")?;
    let delay_ms: i64 = row.try_get("delay_ms")?;
    Ok(AlarmRuleRecord {
        rule_id: row.try_get("rule_id")?,
        project_id: row.try_get("project_id")?,
        tag_id: row.try_get("tag_id")?,
        name: row.try_get("name")?,
        condition: condition.parse::<AlarmCondition>()?,
        threshold: row.try_get("threshold")?,
        severity: severity.parse::<AlarmSeverity>()?,
        deadband: row.try_get("deadband")?,
        delay_ms: delay_ms.max(0) as u64,
        enabled: row.try_get("enabled")?,
    })
}

fn state_from_row(row: &PgRow) -> Result<AlarmStateRecord, StorageError> {
    let classification: String = row.try_get("classification")?;
    Ok(AlarmStateRecord {
        rule_id: row.try_get("rule_id")?,
        classification: classification.parse::<AlarmClassification>()?,
        last_value: row.try_get("last_value")?,
        acknowledged: row.try_get("acknowledged")?,
        acknowledged_by: row.try_get("acknowledged_by")?,
        triggered_at_ms: row.try_get("triggered_at_ms")?,
        pending_since_ms: row.try_get("pending_since_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

#[async_trait::async_trait]
impl AlarmStore for PgAlarmStore {
    async fn list_rules_for_tag(
        &self,
        tag_id: &str,
    ) -> Result<Vec<AlarmRuleRecord>, StorageError> {
        self.fetch_rules("tag_id", tag_id).await
    }

    async fn list_rules_by_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<AlarmRuleRecord>, StorageError> {
        self.fetch_rules("project_id", project_id).await
    }

    async fn find_rule(&self, rule_id: &str) -> Result<Option<AlarmRuleRecord>, StorageError> {
        let sql = format!("select {RULE_COLUMNS} from alarm_rules where rule_id = $1");
        let row = sqlx::query(&sql)
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(rule_from_row(&row)?))
    }

    async fn find_state(&self, rule_id: &str) -> Result<Option<AlarmStateRecord>, StorageError> {
        let sql = format!("select {STATE_COLUMNS} from alarm_states where rule_id = $1");
        let row = sqlx::query(&sql)
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(state_from_row(&row)?))
    }

    async fn upsert_state(&self, state: &AlarmStateRecord) -> Result<(), StorageError> {
        sqlx::query(
            "insert into alarm_states (rule_id, classification, last_value, acknowledged, \
             acknowledged_by, triggered_at_ms, pending_since_ms, updated_at_ms) \
             values ($1, $2, $3, $4, $5, $6, $7, $8) \
             on conflict (rule_id) do update set \
             classification = excluded.classification, \
             last_value = excluded.last_value, \
             acknowledged = excluded.acknowledged, \
             acknowledged_by = excluded.acknowledged_by, \
             triggered_at_ms = excluded.triggered_at_ms, \
             pending_since_ms = excluded.pending_since_ms, \
             updated_at_ms = excluded.updated_at_ms",
        )
        .bind(&state.rule_id)
        .bind(state.classification.as_str())
        .bind(state.last_value)
        .bind(state.acknowledged)
        .bind(&state.acknowledged_by)
        .bind(state.triggered_at_ms)
        .bind(state.pending_since_ms)
        .bind(state.updated_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_event(&self, event: &AlarmEventRecord) -> Result<(), StorageError> {
        sqlx::query(
            "insert into alarm_events (event_id, rule_id, project_id, tag_id, kind, value, \
             threshold, severity, acknowledged_by, message, ts) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, to_timestamp($11 / 1000.0))",
        )
        .bind(&event.event_id)
        .bind(&event.rule_id)
        .bind(&event.project_id)
        .bind(&event.tag_id)
        .bind(event.kind.as_str())
        .bind(event.value)
        .bind(event.threshold)
        .bind(event.severity.as_str())
        .bind(&event.acknowledged_by)
        .bind(&event.message)
        .bind(event.ts_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_events(&self, rule_id: &str) -> Result<Vec<AlarmEventRecord>, StorageError> {
        let rows = sqlx::query(
            "select event_id, rule_id, project_id, tag_id, kind, value, threshold, severity, \
             acknowledged_by, message, (extract(epoch from ts) * 1000)::bigint as ts_ms \
             from alarm_events where rule_id = $1 order by ts, event_id",
        )
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.try_get("kind")?;
            let severity: String = row.try_get("severity")?;
            events.push(AlarmEventRecord {
                event_id: row.try_get("event_id")?,
                rule_id: row.try_get("rule_id")?,
                project_id: row.try_get("project_id")?,
                tag_id: row.try_get("tag_id")?,
                kind: kind.parse::<AlarmEventKind>()?,
                value: row.try_get("value")?,
                threshold: row.try_get("threshold")?,
                severity: severity.parse::<AlarmSeverity>()?,
                acknowledged_by: row.try_get("acknowledged_by")?,
                message: row.try_get("message")?,
                ts_ms: row.try_get("ts_ms")?,
            });
        }
        Ok(events)
    }
}
