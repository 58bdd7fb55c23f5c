//! # PostgreSQL 存储实现模块
//!
//! 依赖的表（由外部管理系统建表与维护）：
//!
//! - `devices`：device_id, project_id, name, transport, connection (jsonb), enabled
//! - `tags`：tag_id, device_id, name, address, value_kind, scaling (jsonb), deadband,
//!   unit, interval_ms, options (jsonb)
//! - `measurements`：tag_id, device_id, project_id, ts, value, quality, source
//! - `alarm_rules`：rule_id, project_id, tag_id, name, condition, threshold, severity,
//!   deadband, delay_ms, enabled
//! - `alarm_states`：rule_id (主键), classification, last_value, acknowledged,
//!   acknowledged_by, triggered_at_ms, pending_since_ms, updated_at_ms
//! - `alarm_events`：event_id, rule_id, project_id, tag_id, kind, value, threshold,
//!   severity, acknowledged_by, message, ts
//!
//! jsonb 列以 `::text` 读出后用 serde_json 解析；所有查询使用参数绑定。

pub mod alarm;
pub mod device;
pub mod measurement;

pub use alarm::*;
pub use device::*;
pub use measurement::*;
