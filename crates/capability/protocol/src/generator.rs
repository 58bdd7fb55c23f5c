//! 模拟发生器适配器（测试与演示用）
//!
//! ```json
//! // tag.options
//! { "pattern": "sine", "min": 0, "max": 100, "period_ms": 60000 }
//! ```

use crate::error::ProtocolError;
use crate::types::{ConnectionState, ProbeResult, StateTable};
use crate::ProtocolAdapter;
use async_trait::async_trait;
use domain::TransportKind;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

/// 波形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    #[default]
    Sine,
    Random,
    Ramp,
    Constant,
}

/// 点位发生器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorOptions {
    #[serde(default)]
    pub pattern: Pattern,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default = "default_period", alias = "periodMs", alias = "period")]
    pub period_ms: u64,
    /// constant 波形的取值（缺省取区间中点）
    #[serde(default)]
    pub value: Option<f64>,
}

fn default_max() -> f64 {
    100.0
}

fn default_period() -> u64 {
    60_000
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            pattern: Pattern::Sine,
            min: 0.0,
            max: default_max(),
            period_ms: default_period(),
            value: None,
        }
    }
}

impl GeneratorOptions {
    pub fn from_value(options: Option<&serde_json::Value>) -> Result<Self, ProtocolError> {
        let options = match options {
            None | Some(serde_json::Value::Null) => return Ok(Self::default()),
            Some(options) => options,
        };
        let parsed: Self = serde_json::from_value(options.clone())
            .map_err(|e| ProtocolError::ConfigParse(format!("generator options: {}", e)))?;
        if !(parsed.min.is_finite() && parsed.max.is_finite()) || parsed.max < parsed.min {
            return Err(ProtocolError::ConfigParse(format!(
                "generator range [{}, {}]",
                parsed.min, parsed.max
            )));
        }
        Ok(parsed)
    }

    /// 在 `now_ms` 时刻生成一个值
    pub fn sample(&self, now_ms: i64) -> f64 {
        let span = self.max - self.min;
        let period = self.period_ms.max(1) as i64;
        let phase = now_ms.rem_euclid(period) as f64 / period as f64;
        match self.pattern {
            Pattern::Sine => {
                let mid = self.min + span / 2.0;
                mid + span / 2.0 * (phase * std::f64::consts::TAU).sin()
            }
            Pattern::Ramp => self.min + span * phase,
            Pattern::Random => self.min + span * unit_random(),
            Pattern::Constant => self.value.unwrap_or(self.min + span / 2.0),
        }
    }
}

/// [0, 1) 均匀分布
fn unit_random() -> f64 {
    (OsRng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
}

/// 模拟发生器适配器：无外部 IO，只维护连接状态
#[derive(Default)]
pub struct GeneratorAdapter {
    states: StateTable,
}

impl GeneratorAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProtocolAdapter for GeneratorAdapter {
    fn transport(&self) -> TransportKind {
        TransportKind::Generator
    }

    async fn probe(&self, _params: &serde_json::Value) -> ProbeResult {
        ProbeResult::reachable(0)
    }

    async fn connect(
        &self,
        device_id: &str,
        _params: &serde_json::Value,
    ) -> Result<(), ProtocolError> {
        self.states.set(device_id, ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self, device_id: &str) {
        self.states.set(device_id, ConnectionState::Disconnected);
    }

    fn status(&self, device_id: &str) -> ConnectionState {
        self.states.get(device_id)
    }
}
