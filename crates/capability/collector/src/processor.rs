//! 单条读数的处理链路：缩放 → 死区 → 写入 → 缓存 → 推送 → 告警评估。
//!
//! 同一点位的读数只由所属设备的采集单元顺序送入，
//! 因此死区判断与缓存更新之间不会插入同一点位的其他读数。

use api_contract::{Broadcaster, FrameType, OutboundFrame};
use domain::{Measurement, Quality, Scaling, TransportKind, ValueKind};
use scada_alarm::AlarmEvaluator;
use scada_storage::{DeviceRecord, MeasurementStore, TagRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::report::CurrentValue;

/// 线性缩放并保留两位小数；未配置量程或原始量程退化时原样返回。
pub fn scale_value(raw: f64, scaling: Option<&Scaling>) -> f64 {
    let Some(scaling) = scaling else {
        return raw;
    };
    let raw_span = scaling.raw_max - scaling.raw_min;
    if raw_span == 0.0 || !raw_span.is_finite() {
        return raw;
    }
    let eng_span = scaling.eng_max - scaling.eng_min;
    let scaled = scaling.eng_min + (raw - scaling.raw_min) * eng_span / raw_span;
    (scaled * 100.0).round() / 100.0
}

/// 按点位值类型收敛：整数四舍五入，布尔非零即 1。
pub fn coerce_value(value: f64, kind: ValueKind) -> f64 {
    match kind {
        ValueKind::Float => value,
        ValueKind::Integer => value.round(),
        ValueKind::Boolean => {
            if value != 0.0 {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// 首个值总是接受；之后变化量不小于死区才接受。
pub fn passes_deadband(last: Option<f64>, value: f64, deadband: f64) -> bool {
    match last {
        None => true,
        Some(last) => (value - last).abs() >= deadband,
    }
}

/// 一条读数的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingOutcome {
    Accepted(Measurement),
    /// 死区内，丢弃
    Suppressed,
    Failed,
}

#[derive(Debug, Clone)]
struct LastValue {
    device_id: String,
    project_id: String,
    value: f64,
    ts_ms: i64,
}

#[derive(Debug, Default)]
struct ReadingCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    suppressed: AtomicU64,
}

/// 读数计数快照：(total, successful, failed, suppressed)
pub type CounterSnapshot = (u64, u64, u64, u64);

/// 读数处理器（各采集单元共用）
pub struct ReadingProcessor {
    measurements: Arc<dyn MeasurementStore>,
    evaluator: Arc<AlarmEvaluator>,
    broadcaster: Arc<dyn Broadcaster>,
    last_values: Mutex<HashMap<String, LastValue>>,
    counters: ReadingCounters,
}

impl ReadingProcessor {
    pub fn new(
        measurements: Arc<dyn MeasurementStore>,
        evaluator: Arc<AlarmEvaluator>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            measurements,
            evaluator,
            broadcaster,
            last_values: Mutex::new(HashMap::new()),
            counters: ReadingCounters::default(),
        }
    }

    pub async fn process(
        &self,
        device: &DeviceRecord,
        source: TransportKind,
        tag: &TagRecord,
        raw: f64,
        ts_ms: i64,
    ) -> ReadingOutcome {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        // 1. 缩放
        let scaled = scale_value(raw, tag.scaling.as_ref());
        if !scaled.is_finite() {
            warn!(
                target: "scada.collector",
                device_id = %device.device_id,
                tag_id = %tag.tag_id,
                raw,
                "reading_not_finite"
            );
            self.record_failure();
            return ReadingOutcome::Failed;
        }
        let value = coerce_value(scaled, tag.value_kind);

        // 2. 死区
        if !passes_deadband(self.last_value(&tag.tag_id), value, tag.deadband) {
            self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(
                target: "scada.collector",
                tag_id = %tag.tag_id,
                value,
                deadband = tag.deadband,
                "reading_suppressed"
            );
            return ReadingOutcome::Suppressed;
        }

        // 3. 写入；失败时丢弃该读数，不更新缓存
        let measurement = Measurement {
            tag_id: tag.tag_id.clone(),
            device_id: device.device_id.clone(),
            project_id: device.project_id.clone(),
            value,
            ts_ms,
            quality: Quality::Good,
            source,
        };
        if let Err(err) = self.measurements.write_measurement(&measurement).await {
            warn!(
                target: "scada.collector",
                device_id = %device.device_id,
                tag_id = %tag.tag_id,
                error = %err,
                "measurement_write_failed"
            );
            self.record_failure();
            return ReadingOutcome::Failed;
        }

        // 4. 缓存
        if let Ok(mut cache) = self.last_values.lock() {
            cache.insert(
                tag.tag_id.clone(),
                LastValue {
                    device_id: device.device_id.clone(),
                    project_id: device.project_id.clone(),
                    value,
                    ts_ms,
                },
            );
        }

        // 5. 推送
        let frame = OutboundFrame::for_project(
            FrameType::Measurement,
            device.project_id.clone(),
            serde_json::json!({
                "tagId": tag.tag_id,
                "tagName": tag.name,
                "deviceId": device.device_id,
                "value": value,
                "unit": tag.unit,
                "quality": Quality::Good,
                "timestamp": ts_ms,
            }),
        );
        self.broadcaster.broadcast(&device.project_id, frame).await;

        // 6. 告警评估；失败只记录，读数本身已接受
        if let Err(err) = self
            .evaluator
            .evaluate(&device.project_id, &tag.tag_id, value, ts_ms)
            .await
        {
            warn!(
                target: "scada.collector",
                tag_id = %tag.tag_id,
                error = %err,
                "alarm_evaluation_failed"
            );
        }

        self.counters.successful.fetch_add(1, Ordering::Relaxed);
        ReadingOutcome::Accepted(measurement)
    }

    /// 适配器读取失败等链路外的失败计数
    pub fn record_failure(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// 读取失败也计入总数
    pub(crate) fn record_read_error(&self) {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.record_failure();
    }

    pub fn last_value(&self, tag_id: &str) -> Option<f64> {
        self.last_values
            .lock()
            .ok()
            .and_then(|cache| cache.get(tag_id).map(|last| last.value))
    }

    /// 项目内所有点位的最新值（按点位排序）
    pub fn current_values(&self, project_id: &str) -> Vec<CurrentValue> {
        let Ok(cache) = self.last_values.lock() else {
            return Vec::new();
        };
        let mut values: Vec<CurrentValue> = cache
            .iter()
            .filter(|(_, last)| last.project_id == project_id)
            .map(|(tag_id, last)| CurrentValue {
                tag_id: tag_id.clone(),
                device_id: last.device_id.clone(),
                value: last.value,
                timestamp: last.ts_ms,
            })
            .collect();
        values.sort_by(|a, b| a.tag_id.cmp(&b.tag_id));
        values
    }

    /// 设备被移除后清理其点位缓存
    pub(crate) fn forget_device(&self, device_id: &str) {
        if let Ok(mut cache) = self.last_values.lock() {
            cache.retain(|_, last| last.device_id != device_id);
        }
    }

    pub fn counters(&self) -> CounterSnapshot {
        (
            self.counters.total.load(Ordering::Relaxed),
            self.counters.successful.load(Ordering::Relaxed),
            self.counters.failed.load(Ordering::Relaxed),
            self.counters.suppressed.load(Ordering::Relaxed),
        )
    }
}
