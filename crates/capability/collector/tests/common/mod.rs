#![allow(dead_code)]

use api_contract::{Broadcaster, FrameType, OutboundFrame};
use async_trait::async_trait;
use domain::ValueKind;
use scada_alarm::AlarmEvaluator;
use scada_collector::{CollectorConfig, CollectorRegistry, RetryPolicy};
use scada_protocol::AdapterSet;
use scada_storage::{
    DeviceRecord, InMemoryAlarmStore, InMemoryDeviceStore, InMemoryMeasurementStore, TagRecord,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct RecordingBroadcaster {
    frames: Mutex<Vec<(String, OutboundFrame)>>,
}

impl RecordingBroadcaster {
    pub fn frames_of(&self, frame_type: FrameType) -> Vec<OutboundFrame> {
        self.frames
            .lock()
            .expect("lock")
            .iter()
            .filter(|(_, frame)| frame.frame_type == frame_type)
            .map(|(_, frame)| frame.clone())
            .collect()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(&self, project_id: &str, frame: OutboundFrame) -> usize {
        self.frames
            .lock()
            .expect("lock")
            .push((project_id.to_string(), frame));
        1
    }
}

pub struct Harness {
    pub devices: Arc<InMemoryDeviceStore>,
    pub measurements: Arc<InMemoryMeasurementStore>,
    pub alarms: Arc<InMemoryAlarmStore>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub registry: CollectorRegistry,
}

pub fn harness() -> Harness {
    let devices = Arc::new(InMemoryDeviceStore::new());
    let measurements = Arc::new(InMemoryMeasurementStore::new());
    let alarms = Arc::new(InMemoryAlarmStore::new());
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let evaluator = Arc::new(AlarmEvaluator::new(alarms.clone(), broadcaster.clone()));
    let config = CollectorConfig {
        scan_interval: Duration::from_secs(3600),
        default_poll_interval: Duration::from_millis(10),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    };
    let registry = CollectorRegistry::new(
        devices.clone(),
        devices.clone(),
        measurements.clone(),
        AdapterSet::default(),
        evaluator,
        broadcaster.clone(),
        config,
    );
    Harness {
        devices,
        measurements,
        alarms,
        broadcaster,
        registry,
    }
}

pub fn generator_device(device_id: &str, project_id: &str) -> DeviceRecord {
    DeviceRecord {
        device_id: device_id.to_string(),
        project_id: project_id.to_string(),
        name: format!("{device_id} simulator"),
        transport: "generator".to_string(),
        connection: serde_json::json!({}),
        enabled: true,
    }
}

pub fn generator_tag(tag_id: &str, device_id: &str, interval_ms: u64, value: f64) -> TagRecord {
    TagRecord {
        tag_id: tag_id.to_string(),
        device_id: device_id.to_string(),
        name: tag_id.to_string(),
        address: tag_id.to_string(),
        value_kind: ValueKind::default(),
        scaling: None,
        deadband: 0.0,
        unit: None,
        interval_ms: Some(interval_ms),
        options: Some(serde_json::json!({ "pattern": "constant", "value": value })),
    }
}
