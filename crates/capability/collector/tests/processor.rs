mod common;

use api_contract::FrameType;
use async_trait::async_trait;
use common::{RecordingBroadcaster, generator_device, generator_tag};
use domain::{
    AlarmCondition, AlarmEventKind, AlarmSeverity, Measurement, Scaling, TransportKind, ValueKind,
};
use scada_alarm::AlarmEvaluator;
use scada_collector::{ReadingOutcome, ReadingProcessor};
use scada_storage::{
    AlarmRuleRecord, AlarmStore, InMemoryAlarmStore, InMemoryMeasurementStore, MeasurementStore,
    StorageError,
};
use std::sync::Arc;

struct Fixture {
    measurements: Arc<InMemoryMeasurementStore>,
    alarms: Arc<InMemoryAlarmStore>,
    broadcaster: Arc<RecordingBroadcaster>,
    processor: ReadingProcessor,
}

fn fixture() -> Fixture {
    let measurements = Arc::new(InMemoryMeasurementStore::new());
    let alarms = Arc::new(InMemoryAlarmStore::new());
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let evaluator = Arc::new(AlarmEvaluator::new(alarms.clone(), broadcaster.clone()));
    let processor = ReadingProcessor::new(measurements.clone(), evaluator, broadcaster.clone());
    Fixture {
        measurements,
        alarms,
        broadcaster,
        processor,
    }
}

#[tokio::test]
async fn raw_reading_is_scaled_before_storage() {
    let fixture = fixture();
    let device = generator_device("device-1", "7");
    let mut tag = generator_tag("tag-1", "device-1", 1000, 0.0);
    tag.scaling = Some(Scaling {
        raw_min: 0.0,
        raw_max: 1000.0,
        eng_min: 0.0,
        eng_max: 100.0,
    });

    let outcome = fixture
        .processor
        .process(&device, TransportKind::Generator, &tag, 500.0, 1_000)
        .await;

    assert!(matches!(outcome, ReadingOutcome::Accepted(ref m) if m.value == 50.0));
    let stored = fixture.measurements.values_for_tag("tag-1");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].value, 50.0);
    assert_eq!(stored[0].project_id, "7");

    let frames = fixture.broadcaster.frames_of(FrameType::Measurement);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].project_id.as_deref(), Some("7"));
    assert_eq!(frames[0].data["value"], 50.0);
}

#[tokio::test]
async fn accepted_readings_respect_deadband() {
    let fixture = fixture();
    let device = generator_device("device-1", "7");
    let mut tag = generator_tag("tag-1", "device-1", 1000, 0.0);
    tag.deadband = 1.0;

    let readings = [10.0, 10.5, 10.9, 11.0, 12.5, 12.0, 11.4, 20.0, 19.5];
    for (index, raw) in readings.iter().enumerate() {
        fixture
            .processor
            .process(&device, TransportKind::Generator, &tag, *raw, index as i64)
            .await;
    }

    let accepted: Vec<f64> = fixture
        .measurements
        .values_for_tag("tag-1")
        .iter()
        .map(|m| m.value)
        .collect();
    assert_eq!(accepted, vec![10.0, 11.0, 12.5, 11.4, 20.0]);
    for pair in accepted.windows(2) {
        assert!((pair[1] - pair[0]).abs() >= 1.0);
    }
    assert_eq!(fixture.processor.last_value("tag-1"), Some(20.0));
}

#[tokio::test]
async fn non_finite_readings_are_failures() {
    let fixture = fixture();
    let device = generator_device("device-1", "7");
    let tag = generator_tag("tag-1", "device-1", 1000, 0.0);

    let outcome = fixture
        .processor
        .process(&device, TransportKind::Generator, &tag, f64::NAN, 1)
        .await;

    assert_eq!(outcome, ReadingOutcome::Failed);
    assert!(fixture.measurements.is_empty());
    assert_eq!(fixture.processor.last_value("tag-1"), None);
}

#[tokio::test]
async fn accepted_readings_drive_alarm_rules() {
    let fixture = fixture();
    fixture
        .alarms
        .upsert_rule(AlarmRuleRecord {
            rule_id: "rule-1".to_string(),
            project_id: "7".to_string(),
            tag_id: "tag-1".to_string(),
            name: "tank high".to_string(),
            condition: AlarmCondition::High,
            threshold: 80.0,
            severity: AlarmSeverity::Critical,
            deadband: 0.0,
            delay_ms: 0,
            enabled: true,
        })
        .expect("rule");
    let device = generator_device("device-1", "7");
    let tag = generator_tag("tag-1", "device-1", 1000, 0.0);

    for (ts, raw) in [(1, 79.0), (2, 81.0), (3, 82.0), (4, 79.0)] {
        fixture
            .processor
            .process(&device, TransportKind::Generator, &tag, raw, ts)
            .await;
    }

    let kinds: Vec<_> = fixture
        .alarms
        .list_events("rule-1")
        .await
        .expect("events")
        .iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(kinds, vec![AlarmEventKind::Triggered, AlarmEventKind::Cleared]);

    let current = fixture.processor.current_values("7");
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].value, 79.0);
    assert!(fixture.processor.current_values("8").is_empty());
}

/// 每次写入都失败的测量值存储
struct UnavailableMeasurements;

#[async_trait]
impl MeasurementStore for UnavailableMeasurements {
    async fn write_measurement(&self, _value: &Measurement) -> Result<(), StorageError> {
        Err(StorageError::new("database unavailable"))
    }
}

#[tokio::test]
async fn failed_write_drops_the_reading() {
    let alarms = Arc::new(InMemoryAlarmStore::new());
    alarms
        .upsert_rule(AlarmRuleRecord {
            rule_id: "rule-1".to_string(),
            project_id: "7".to_string(),
            tag_id: "tag-1".to_string(),
            name: "tank high".to_string(),
            condition: AlarmCondition::High,
            threshold: 80.0,
            severity: AlarmSeverity::Warning,
            deadband: 0.0,
            delay_ms: 0,
            enabled: true,
        })
        .expect("rule");
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let evaluator = Arc::new(AlarmEvaluator::new(alarms.clone(), broadcaster.clone()));
    let processor = ReadingProcessor::new(
        Arc::new(UnavailableMeasurements),
        evaluator,
        broadcaster.clone(),
    );
    let device = generator_device("device-1", "7");
    let tag = generator_tag("tag-1", "device-1", 1000, 0.0);

    let outcome = processor
        .process(&device, TransportKind::Generator, &tag, 95.0, 1)
        .await;

    assert_eq!(outcome, ReadingOutcome::Failed);
    assert_eq!(processor.counters(), (1, 0, 1, 0));
    assert_eq!(processor.last_value("tag-1"), None);
    assert!(processor.current_values("7").is_empty());
    assert!(broadcaster.frames_of(FrameType::Measurement).is_empty());
    assert!(broadcaster.frames_of(FrameType::AlarmTriggered).is_empty());
    assert!(alarms.list_events("rule-1").await.expect("events").is_empty());
}

#[tokio::test]
async fn integer_tags_are_rounded_before_deadband() {
    let fixture = fixture();
    let device = generator_device("device-1", "7");
    let mut tag = generator_tag("tag-1", "device-1", 1000, 0.0);
    tag.value_kind = ValueKind::Integer;
    tag.deadband = 1.0;

    for (ts, raw) in [(1, 10.2), (2, 10.4), (3, 11.6)] {
        fixture
            .processor
            .process(&device, TransportKind::Generator, &tag, raw, ts)
            .await;
    }

    let accepted: Vec<f64> = fixture
        .measurements
        .values_for_tag("tag-1")
        .iter()
        .map(|m| m.value)
        .collect();
    assert_eq!(accepted, vec![10.0, 12.0]);
    assert_eq!(fixture.processor.counters(), (3, 2, 0, 1));
}
