//! Modbus TCP 适配器
//!
//! 每个设备一条长连接，按点位读取寄存器；读失败时丢弃连接，下一轮轮询再惰性重连。
//!
//! ```json
//! // device.connection
//! { "host": "192.168.1.100", "port": 502, "unit_id": 1, "read_timeout_ms": 3000 }
//!
//! // tag.address：寄存器号（保持寄存器 + int16）或寄存器详情
//! "100"
//! { "function_code": 3, "register_address": 100, "data_type": "float32" }
//! ```

use crate::error::ProtocolError;
use crate::probe::probe_tcp;
use crate::types::{
    ConnectionState, ModbusConnection, ModbusDataType, ModbusTagAddress, ProbeFailure,
    ProbeResult, ProbeSettings, StateTable,
};
use crate::ProtocolAdapter;
use async_trait::async_trait;
use domain::TransportKind;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

struct ModbusSession {
    ctx: Arc<tokio::sync::Mutex<Context>>,
    read_timeout: Duration,
}

/// Modbus TCP 适配器
pub struct ModbusTcpAdapter {
    sessions: Mutex<HashMap<String, ModbusSession>>,
    states: StateTable,
    probe: ProbeSettings,
}

impl ModbusTcpAdapter {
    pub fn new(probe: ProbeSettings) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            states: StateTable::default(),
            probe,
        }
    }

    /// 解析设备连接参数
    pub fn parse_connection(params: &serde_json::Value) -> Result<ModbusConnection, ProtocolError> {
        serde_json::from_value(params.clone())
            .map_err(|e| ProtocolError::ConfigParse(format!("modbus connection: {}", e)))
    }

    /// 读取单个点位。连接不存在时先按 `params` 重连。
    pub async fn read(
        &self,
        device_id: &str,
        params: &serde_json::Value,
        address: &str,
    ) -> Result<f64, ProtocolError> {
        let tag = parse_tag_address(address)?;
        if self.session(device_id)?.is_none() {
            self.connect(device_id, params).await?;
        }
        let (ctx, read_timeout) = self
            .session(device_id)?
            .ok_or_else(|| ProtocolError::NotConnected(device_id.to_string()))?;

        let result = {
            let mut ctx = ctx.lock().await;
            match timeout(read_timeout, read_tag(&mut ctx, &tag)).await {
                Ok(result) => result,
                Err(_) => Err(ProtocolError::Timeout(format!(
                    "read register {} after {} ms",
                    tag.register_address,
                    read_timeout.as_millis()
                ))),
            }
        };

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(
                    target: "scada.protocol",
                    device_id,
                    register = tag.register_address,
                    error = %err,
                    "modbus_read_failed"
                );
                self.states.set(device_id, ConnectionState::Error);
                self.drop_session(device_id);
                Err(err)
            }
        }
    }

    fn session(
        &self,
        device_id: &str,
    ) -> Result<Option<(Arc<tokio::sync::Mutex<Context>>, Duration)>, ProtocolError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| ProtocolError::Connection("lock failed".to_string()))?;
        Ok(sessions
            .get(device_id)
            .map(|session| (session.ctx.clone(), session.read_timeout)))
    }

    fn drop_session(&self, device_id: &str) -> Option<ModbusSession> {
        self.sessions
            .lock()
            .ok()
            .and_then(|mut sessions| sessions.remove(device_id))
    }
}

#[async_trait]
impl ProtocolAdapter for ModbusTcpAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Modbus
    }

    async fn probe(&self, params: &serde_json::Value) -> ProbeResult {
        match Self::parse_connection(params) {
            Ok(config) => probe_tcp(&config.host, config.port, &self.probe).await,
            Err(err) => ProbeResult::failed(ProbeFailure::InvalidConfig, err.to_string()),
        }
    }

    async fn connect(
        &self,
        device_id: &str,
        params: &serde_json::Value,
    ) -> Result<(), ProtocolError> {
        if self.session(device_id)?.is_some() {
            return Ok(());
        }
        let config = Self::parse_connection(params)?;
        self.states.set(device_id, ConnectionState::Connecting);

        let connected = async {
            let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
                .await?
                .next()
                .ok_or_else(|| {
                    ProtocolError::Connection(format!("cannot resolve {}", config.host))
                })?;
            let ctx = tcp::connect_slave(addr, Slave(config.unit_id))
                .await
                .map_err(|e| ProtocolError::Connection(e.to_string()))?;
            Ok::<_, ProtocolError>((addr, ctx))
        };
        let (addr, ctx) = match timeout(self.probe.timeout, connected).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(err)) => {
                self.states.set(device_id, ConnectionState::Error);
                return Err(err);
            }
            Err(_) => {
                self.states.set(device_id, ConnectionState::Error);
                return Err(ProtocolError::Timeout(format!(
                    "connect {}:{}",
                    config.host, config.port
                )));
            }
        };

        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ProtocolError::Connection("lock failed".to_string()))?;
        sessions.insert(
            device_id.to_string(),
            ModbusSession {
                ctx: Arc::new(tokio::sync::Mutex::new(ctx)),
                read_timeout: Duration::from_millis(config.read_timeout_ms.max(1)),
            },
        );
        self.states.set(device_id, ConnectionState::Connected);
        info!(target: "scada.protocol", device_id, %addr, unit_id = config.unit_id, "modbus_connected");
        Ok(())
    }

    async fn disconnect(&self, device_id: &str) {
        if let Some(session) = self.drop_session(device_id) {
            let mut ctx = session.ctx.lock().await;
            let _ = ctx.disconnect().await;
            info!(target: "scada.protocol", device_id, "modbus_disconnected");
        }
        self.states.set(device_id, ConnectionState::Disconnected);
    }

    fn status(&self, device_id: &str) -> ConnectionState {
        self.states.get(device_id)
    }
}

/// 解析点位地址：纯数字为保持寄存器号（int16），否则按 JSON 寄存器详情解析。
pub fn parse_tag_address(address: &str) -> Result<ModbusTagAddress, ProtocolError> {
    let trimmed = address.trim();
    if let Ok(register_address) = trimmed.parse::<u16>() {
        return Ok(ModbusTagAddress {
            function_code: 3,
            register_address,
            register_count: None,
            data_type: ModbusDataType::Int16,
            byte_order: "big_endian".to_string(),
        });
    }
    let tag: ModbusTagAddress = serde_json::from_str(trimmed)
        .map_err(|e| ProtocolError::ConfigParse(format!("tag address {trimmed}: {e}")))?;
    if !(1..=4).contains(&tag.function_code) {
        return Err(ProtocolError::ConfigParse(format!(
            "unsupported function code: {}",
            tag.function_code
        )));
    }
    Ok(tag)
}

async fn read_tag(ctx: &mut Context, tag: &ModbusTagAddress) -> Result<f64, ProtocolError> {
    let count = tag.effective_count();
    let value = match tag.function_code {
        1 => {
            let bits = ctx
                .read_coils(tag.register_address, count)
                .await
                .map_err(|e| ProtocolError::Modbus(e.to_string()))?
                .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?;
            bit_value(&bits)?
        }
        2 => {
            let bits = ctx
                .read_discrete_inputs(tag.register_address, count)
                .await
                .map_err(|e| ProtocolError::Modbus(e.to_string()))?
                .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?;
            bit_value(&bits)?
        }
        3 => {
            let registers = ctx
                .read_holding_registers(tag.register_address, count)
                .await
                .map_err(|e| ProtocolError::Modbus(e.to_string()))?
                .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?;
            decode_registers(&ordered(registers, &tag.byte_order), tag.data_type)?
        }
        4 => {
            let registers = ctx
                .read_input_registers(tag.register_address, count)
                .await
                .map_err(|e| ProtocolError::Modbus(e.to_string()))?
                .map_err(|e| ProtocolError::Modbus(format!("exception: {:?}", e)))?;
            decode_registers(&ordered(registers, &tag.byte_order), tag.data_type)?
        }
        other => {
            return Err(ProtocolError::ConfigParse(format!(
                "unsupported function code: {other}"
            )));
        }
    };
    debug!(
        target: "scada.protocol",
        register = tag.register_address,
        function_code = tag.function_code,
        value,
        "modbus_read"
    );
    Ok(value)
}

fn bit_value(bits: &[bool]) -> Result<f64, ProtocolError> {
    match bits.first() {
        Some(true) => Ok(1.0),
        Some(false) => Ok(0.0),
        None => Err(ProtocolError::DataParse("empty coils".to_string())),
    }
}

fn ordered(mut registers: Vec<u16>, byte_order: &str) -> Vec<u16> {
    if byte_order.eq_ignore_ascii_case("little_endian") {
        registers.reverse();
    }
    registers
}

/// 解析寄存器数据为浮点值（高字在前）
pub fn decode_registers(registers: &[u16], data_type: ModbusDataType) -> Result<f64, ProtocolError> {
    let needed = data_type.register_count() as usize;
    if registers.len() < needed {
        return Err(ProtocolError::DataParse(format!(
            "need {} registers for {:?}, got {}",
            needed,
            data_type,
            registers.len()
        )));
    }

    let value = match data_type {
        ModbusDataType::Int16 => registers[0] as i16 as f64,
        ModbusDataType::Uint16 => registers[0] as f64,
        ModbusDataType::Int32 => {
            let high = registers[0] as u32;
            let low = registers[1] as u32;
            ((high << 16) | low) as i32 as f64
        }
        ModbusDataType::Uint32 => {
            let high = registers[0] as u32;
            let low = registers[1] as u32;
            ((high << 16) | low) as f64
        }
        ModbusDataType::Float32 => {
            let high = registers[0] as u32;
            let low = registers[1] as u32;
            f32::from_bits((high << 16) | low) as f64
        }
        ModbusDataType::Float64 => {
            let bits = registers[..4]
                .iter()
                .fold(0u64, |acc, register| (acc << 16) | *register as u64);
            f64::from_bits(bits)
        }
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_register_address() {
        let tag = parse_tag_address("100").unwrap();
        assert_eq!(tag.function_code, 3);
        assert_eq!(tag.register_address, 100);
        assert_eq!(tag.data_type, ModbusDataType::Int16);
        assert_eq!(tag.effective_count(), 1);
    }

    #[test]
    fn test_parse_register_detail() {
        let json = r#"{"function_code": 4, "register_address": 10, "data_type": "float32"}"#;
        let tag = parse_tag_address(json).unwrap();
        assert_eq!(tag.function_code, 4);
        assert_eq!(tag.effective_count(), 2);

        let coil = parse_tag_address(r#"{"function_code": 1, "register_address": 5}"#).unwrap();
        assert_eq!(coil.effective_count(), 1);

        assert!(parse_tag_address(r#"{"function_code": 6, "register_address": 5}"#).is_err());
        assert!(parse_tag_address("holding:abc").is_err());
    }

    #[test]
    fn test_decode_registers() {
        assert_eq!(decode_registers(&[100], ModbusDataType::Int16).unwrap(), 100.0);
        assert_eq!(
            decode_registers(&[(-100i16) as u16], ModbusDataType::Int16).unwrap(),
            -100.0
        );
        assert_eq!(decode_registers(&[0xFFFF], ModbusDataType::Uint16).unwrap(), 65535.0);
        assert_eq!(
            decode_registers(&[0xFFFF, 0xFFFE], ModbusDataType::Int32).unwrap(),
            -2.0
        );
        assert_eq!(
            decode_registers(&[0x0001, 0x0000], ModbusDataType::Uint32).unwrap(),
            65536.0
        );

        let bits = 12.5f32.to_bits();
        let registers = [(bits >> 16) as u16, bits as u16];
        assert_eq!(decode_registers(&registers, ModbusDataType::Float32).unwrap(), 12.5);

        let bits = (-3.25f64).to_bits();
        let registers = [
            (bits >> 48) as u16,
            (bits >> 32) as u16,
            (bits >> 16) as u16,
            bits as u16,
        ];
        assert_eq!(decode_registers(&registers, ModbusDataType::Float64).unwrap(), -3.25);

        assert!(decode_registers(&[1], ModbusDataType::Float32).is_err());
    }

    #[test]
    fn test_little_endian_word_order() {
        let bits = 12.5f32.to_bits();
        let registers = vec![bits as u16, (bits >> 16) as u16];
        let value =
            decode_registers(&ordered(registers, "little_endian"), ModbusDataType::Float32).unwrap();
        assert_eq!(value, 12.5);
    }

    #[test]
    fn test_parse_connection_aliases() {
        let params = serde_json::json!({"host": "10.0.0.5", "slave_id": 3});
        let config = ModbusTcpAdapter::parse_connection(&params).unwrap();
        assert_eq!(config.port, 502);
        assert_eq!(config.unit_id, 3);
        assert!(ModbusTcpAdapter::parse_connection(&serde_json::json!({"port": 502})).is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_marks_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let adapter = ModbusTcpAdapter::new(ProbeSettings::default());
        let params = serde_json::json!({"host": "127.0.0.1", "port": port});
        assert!(adapter.connect("dev-1", &params).await.is_err());
        assert_eq!(adapter.status("dev-1"), ConnectionState::Error);

        adapter.disconnect("dev-1").await;
        assert_eq!(adapter.status("dev-1"), ConnectionState::Disconnected);
    }
}
