//! # 协议适配能力模块
//!
//! 统一能力集：probe / connect / 读取或订阅 / disconnect / status。
//!
//! - **Modbus TCP**：轮询寄存器（[`ModbusTcpAdapter::read`]）
//! - **MQTT**：订阅主题，消息推送给 [`PushHandler`]
//! - **Generator**：按波形生成模拟值，由 [`TagScheduler`] 驱动
//!
//! 传输方式是闭集，[`AdapterSet::get`] 按 [`TransportKind`] 分发。

mod error;
mod generator;
mod modbus_tcp;
mod mqtt;
mod probe;
mod scheduler;
mod types;

use async_trait::async_trait;
use domain::TransportKind;
use std::sync::Arc;

pub use error::ProtocolError;
pub use generator::{GeneratorAdapter, GeneratorOptions, Pattern};
pub use modbus_tcp::{ModbusTcpAdapter, decode_registers, parse_tag_address};
pub use mqtt::{MqttAdapter, PushHandler, parse_payload, topic_matches};
pub use probe::{classify_io_error, probe_tcp};
pub use scheduler::TagScheduler;
pub use types::{
    ConnectionState, ModbusConnection, ModbusDataType, ModbusTagAddress, MqttConnection,
    ProbeFailure, ProbeResult, ProbeSettings,
};

/// 协议适配器公共能力
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn transport(&self) -> TransportKind;

    /// 连通性探测（带超时，从不返回错误）
    async fn probe(&self, params: &serde_json::Value) -> ProbeResult;

    /// 建立连接；同一设备已连接时复用
    async fn connect(&self, device_id: &str, params: &serde_json::Value)
    -> Result<(), ProtocolError>;

    /// 断开连接；可重复调用
    async fn disconnect(&self, device_id: &str);

    fn status(&self, device_id: &str) -> ConnectionState;
}

/// 全部适配器实例
#[derive(Clone)]
pub struct AdapterSet {
    pub modbus: Arc<ModbusTcpAdapter>,
    pub mqtt: Arc<MqttAdapter>,
    pub generator: Arc<GeneratorAdapter>,
}

impl AdapterSet {
    pub fn new(probe: ProbeSettings) -> Self {
        Self {
            modbus: Arc::new(ModbusTcpAdapter::new(probe)),
            mqtt: Arc::new(MqttAdapter::new(probe)),
            generator: Arc::new(GeneratorAdapter::new()),
        }
    }

    pub fn get(&self, kind: TransportKind) -> &dyn ProtocolAdapter {
        match kind {
            TransportKind::Modbus => self.modbus.as_ref(),
            TransportKind::Mqtt => self.mqtt.as_ref(),
            TransportKind::Generator => self.generator.as_ref(),
        }
    }
}

impl Default for AdapterSet {
    fn default() -> Self {
        Self::new(ProbeSettings::default())
    }
}
