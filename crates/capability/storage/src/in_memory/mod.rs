//! 内存存储实现模块
//!
//! 仅用于测试和本地演示。

pub mod alarm;
pub mod device;
pub mod measurement;

pub use alarm::*;
pub use device::*;
pub use measurement::*;
