//! # SCADA Storage 模块
//!
//! 持久化网关：实时引擎通过这里读取设备、点位与告警规则配置，
//! 写入测量值、告警状态与告警事件。
//!
//! - [`traits`]：存储接口（DeviceStore / TagStore / MeasurementStore / AlarmStore）
//! - [`models`]：存储记录
//! - [`in_memory`]：`RwLock<HashMap>` 内存实现，用于测试与本地演示
//! - [`postgres`]：PostgreSQL 实现，全部使用参数化 SQL，不负责建表迁移

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod traits;

pub use connection::*;
pub use error::*;
pub use models::*;
pub use traits::*;

pub use in_memory::{InMemoryAlarmStore, InMemoryDeviceStore, InMemoryMeasurementStore};

pub use postgres::{PgAlarmStore, PgDeviceStore, PgMeasurementStore, PgTagStore};
