//! Handlers 模块

pub mod admin;
pub mod metrics;
pub mod realtime;

pub use admin::*;
pub use metrics::*;
pub use realtime::*;
