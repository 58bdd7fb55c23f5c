//! 采集注册表：采集器生命周期、周期对账与统计。
//!
//! 生命周期操作（对账、单设备启停、整体停止）由 `lifecycle` 锁串行化；
//! 采集器表本身只在短临界区内读写，统计与状态查询不会被慢连接阻塞。

use api_contract::{Broadcaster, FrameType, OutboundFrame};
use domain::{TransportKind, now_epoch_ms};
use scada_alarm::AlarmEvaluator;
use scada_protocol::{AdapterSet, ModbusTcpAdapter, ProbeResult, ProtocolError};
use scada_storage::{DeviceRecord, DeviceStore, MeasurementStore, TagRecord, TagStore};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::acquisition::{DeviceContext, spawn_generator, spawn_modbus_poll, subscribe_mqtt};
use crate::processor::ReadingProcessor;
use crate::report::{CollectorStatistics, CurrentValue, DeviceRunInfo, ScanFailure, ScanReport};
use crate::retry::connect_with_retry;
use crate::{CollectorConfig, CollectorError};

/// 单个设备的采集器
struct Collector {
    ctx: Arc<DeviceContext>,
    fingerprint: u64,
    cancel: CancellationToken,
    /// MQTT 采集器没有自己的任务（由适配器事件循环回调）
    task: Option<JoinHandle<()>>,
    started_at_ms: i64,
}

/// 周期对账任务
struct ScanTask {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    started_at: Instant,
}

struct RegistryInner {
    devices: Arc<dyn DeviceStore>,
    tags: Arc<dyn TagStore>,
    adapters: AdapterSet,
    processor: Arc<ReadingProcessor>,
    broadcaster: Arc<dyn Broadcaster>,
    config: CollectorConfig,
    collectors: Mutex<HashMap<String, Collector>>,
    lifecycle: tokio::sync::Mutex<()>,
    /// 已调用 start 且尚未 stop；首轮对账期间即为 true
    running: AtomicBool,
    scan: tokio::sync::Mutex<Option<ScanTask>>,
}

/// 采集注册表
#[derive(Clone)]
pub struct CollectorRegistry {
    inner: Arc<RegistryInner>,
}

impl CollectorRegistry {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        tags: Arc<dyn TagStore>,
        measurements: Arc<dyn MeasurementStore>,
        adapters: AdapterSet,
        evaluator: Arc<AlarmEvaluator>,
        broadcaster: Arc<dyn Broadcaster>,
        config: CollectorConfig,
    ) -> Self {
        let processor = Arc::new(ReadingProcessor::new(
            measurements,
            evaluator,
            broadcaster.clone(),
        ));
        Self {
            inner: Arc::new(RegistryInner {
                devices,
                tags,
                adapters,
                processor,
                broadcaster,
                config,
                collectors: Mutex::new(HashMap::new()),
                lifecycle: tokio::sync::Mutex::new(()),
                running: AtomicBool::new(false),
                scan: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// 立即对账一次，然后按周期对账。重复调用返回 `AlreadyRunning`。
    ///
    /// 首轮对账（含连接重试）不持有对账任务锁，期间统计与状态查询不受阻塞。
    pub async fn start(&self) -> Result<ScanReport, CollectorError> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CollectorError::AlreadyRunning);
        }

        let report = match self.scan_and_reconcile().await {
            Ok(report) => report,
            Err(err) => {
                // 存储暂不可用时仍然启动，由下一轮对账补上
                error!(target: "scada.collector", error = %err, "initial_scan_failed");
                ScanReport::default()
            }
        };

        let mut scan = self.inner.scan.lock().await;
        // 首轮对账期间已被 stop，或已有对账任务
        if !self.inner.running.load(Ordering::Acquire) || scan.is_some() {
            return Ok(report);
        }
        let cancel = CancellationToken::new();
        let registry = self.clone();
        let interval = self.inner.config.scan_interval;
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(err) = registry.scan_and_reconcile().await {
                    error!(target: "scada.collector", error = %err, "scan_failed");
                }
            }
        });
        *scan = Some(ScanTask {
            cancel,
            task,
            started_at: Instant::now(),
        });
        info!(
            target: "scada.collector",
            scan_interval_seconds = interval.as_secs(),
            started = report.started.len(),
            failed = report.failed.len(),
            "collector_registry_started"
        );
        Ok(report)
    }

    /// 停止对账任务与全部采集器。未启动时也可调用。
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        if let Some(scan) = self.inner.scan.lock().await.take() {
            scan.cancel.cancel();
            if let Err(err) = scan.task.await {
                warn!(target: "scada.collector", error = %err, "scan_task_join_failed");
            }
        }

        let _lifecycle = self.inner.lifecycle.lock().await;
        let collectors: Vec<Collector> = match self.inner.collectors.lock() {
            Ok(mut map) => map.drain().map(|(_, collector)| collector).collect(),
            Err(_) => Vec::new(),
        };
        let count = collectors.len();
        for collector in collectors {
            self.shutdown_collector(collector).await;
        }
        info!(target: "scada.collector", stopped = count, "collector_registry_stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// 手动启动单个设备；已有采集器时先停止再重建。
    pub async fn start_device(&self, device_id: &str) -> Result<DeviceRunInfo, CollectorError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let device = self
            .inner
            .devices
            .find_device(device_id)
            .await?
            .ok_or_else(|| CollectorError::NotFound(device_id.to_string()))?;
        let tags = self.inner.tags.list_tags_by_device(device_id).await?;
        if tags.is_empty() {
            return Err(CollectorError::NotConfigured(device_id.to_string()));
        }

        if let Some(existing) = self.take_collector(device_id) {
            self.shutdown_collector(existing).await;
        }
        let collector = self.launch(device, tags).await?;
        let info = self.run_info(&collector);
        self.insert_collector(collector);
        Ok(info)
    }

    /// 手动停止单个设备；返回是否存在采集器。
    pub async fn stop_device(&self, device_id: &str) -> bool {
        let _lifecycle = self.inner.lifecycle.lock().await;
        match self.take_collector(device_id) {
            Some(collector) => {
                self.shutdown_collector(collector).await;
                true
            }
            None => false,
        }
    }

    /// 与存储中的配置对账：新设备启动，配置变化的重建，消失的移除。
    pub async fn scan_and_reconcile(&self) -> Result<ScanReport, CollectorError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let devices = self.inner.devices.list_active_devices().await?;
        let mut report = ScanReport::default();
        let mut configured = HashSet::new();

        for device in devices {
            let device_id = device.device_id.clone();
            let tags = match self.inner.tags.list_tags_by_device(&device_id).await {
                Ok(tags) => tags,
                Err(err) => {
                    // 读取失败时保留现有采集器
                    configured.insert(device_id.clone());
                    report.failed.push(ScanFailure {
                        device_id,
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            if tags.is_empty() {
                continue;
            }
            configured.insert(device_id.clone());

            let fingerprint = fingerprint(&device, &tags);
            let replaced = match self.collector_fingerprint(&device_id) {
                Some(existing) if existing == fingerprint => {
                    report.unchanged += 1;
                    continue;
                }
                Some(_) => {
                    if let Some(collector) = self.take_collector(&device_id) {
                        self.shutdown_collector(collector).await;
                    }
                    true
                }
                None => false,
            };

            match self.launch(device, tags).await {
                Ok(collector) => {
                    self.insert_collector(collector);
                    if replaced {
                        report.replaced.push(device_id);
                    } else {
                        report.started.push(device_id);
                    }
                }
                Err(err) => report.failed.push(ScanFailure {
                    device_id,
                    error: err.to_string(),
                }),
            }
        }

        let orphaned: Vec<String> = self
            .collector_ids()
            .into_iter()
            .filter(|device_id| !configured.contains(device_id))
            .collect();
        for device_id in orphaned {
            if let Some(collector) = self.take_collector(&device_id) {
                self.shutdown_collector(collector).await;
                self.inner.processor.forget_device(&device_id);
                report.evicted.push(device_id);
            }
        }

        info!(
            target: "scada.collector",
            started = report.started.len(),
            replaced = report.replaced.len(),
            evicted = report.evicted.len(),
            unchanged = report.unchanged,
            failed = report.failed.len(),
            "scan_completed"
        );
        Ok(report)
    }

    pub async fn get_statistics(&self) -> CollectorStatistics {
        let uptime_seconds = self
            .inner
            .scan
            .lock()
            .await
            .as_ref()
            .map(|scan| scan.started_at.elapsed().as_secs());
        let (total, successful, failed, suppressed) = self.inner.processor.counters();
        let (active_devices, active_tags) = match self.inner.collectors.lock() {
            Ok(map) => (
                map.len(),
                map.values().map(|collector| collector.ctx.tags.len()).sum(),
            ),
            Err(_) => (0, 0),
        };
        CollectorStatistics {
            running: self.inner.running.load(Ordering::Acquire),
            total_readings: total,
            successful_readings: successful,
            failed_readings: failed,
            suppressed_readings: suppressed,
            active_devices,
            active_tags,
            uptime_seconds: uptime_seconds.unwrap_or(0),
        }
    }

    /// 全部采集器运行信息（按设备排序）
    pub fn get_device_status(&self) -> Vec<DeviceRunInfo> {
        let Ok(map) = self.inner.collectors.lock() else {
            return Vec::new();
        };
        let mut items: Vec<DeviceRunInfo> =
            map.values().map(|collector| self.run_info(collector)).collect();
        items.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        items
    }

    pub fn current_values(&self, project_id: &str) -> Vec<CurrentValue> {
        self.inner.processor.current_values(project_id)
    }

    /// 对已配置设备执行连通性探测
    pub async fn probe_device(&self, device_id: &str) -> Result<ProbeResult, CollectorError> {
        let device = self
            .inner
            .devices
            .find_device(device_id)
            .await?
            .ok_or_else(|| CollectorError::NotFound(device_id.to_string()))?;
        let kind = device
            .transport_kind()
            .map_err(|err| CollectorError::Configuration(err.to_string()))?;
        Ok(self.inner.adapters.get(kind).probe(&device.connection).await)
    }

    pub fn collector_count(&self) -> usize {
        self.inner
            .collectors
            .lock()
            .map(|map| map.len())
            .unwrap_or(0)
    }

    /// 连接设备并启动对应的采集单元
    async fn launch(
        &self,
        device: DeviceRecord,
        tags: Vec<TagRecord>,
    ) -> Result<Collector, CollectorError> {
        let kind = device
            .transport_kind()
            .map_err(|err| CollectorError::Configuration(err.to_string()))?;
        let fingerprint = fingerprint(&device, &tags);
        let adapter = self.inner.adapters.get(kind);
        let device_id = device.device_id.clone();

        if let Err(err) = connect_with_retry(
            adapter,
            &device_id,
            &device.connection,
            &self.inner.config.retry,
        )
        .await
        {
            warn!(
                target: "scada.collector",
                device_id = %device_id,
                transport = kind.as_str(),
                error = %err,
                "device_connect_failed"
            );
            self.broadcast_status(&device, kind, "error", Some(err.to_string()))
                .await;
            return Err(match err {
                ProtocolError::ConfigParse(message) => CollectorError::Configuration(message),
                other => CollectorError::Connection(other.to_string()),
            });
        }

        let ctx = Arc::new(DeviceContext::new(
            device,
            kind,
            tags,
            self.inner.processor.clone(),
        ));
        let cancel = CancellationToken::new();
        let task = match kind {
            TransportKind::Modbus => {
                let interval = ModbusTcpAdapter::parse_connection(&ctx.device.connection)
                    .ok()
                    .and_then(|connection| connection.poll_interval_ms)
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
                    .unwrap_or(self.inner.config.default_poll_interval);
                Some(spawn_modbus_poll(
                    ctx.clone(),
                    self.inner.adapters.modbus.clone(),
                    interval,
                    cancel.clone(),
                ))
            }
            TransportKind::Mqtt => {
                let subscribed = subscribe_mqtt(ctx.clone(), &self.inner.adapters.mqtt, &cancel).await;
                if subscribed == 0 {
                    warn!(target: "scada.collector", device_id = %device_id, "mqtt_no_subscriptions");
                }
                None
            }
            TransportKind::Generator => Some(spawn_generator(
                ctx.clone(),
                self.inner.config.default_poll_interval,
                cancel.clone(),
            )),
        };

        info!(
            target: "scada.collector",
            device_id = %device_id,
            project_id = %ctx.device.project_id,
            transport = kind.as_str(),
            tag_count = ctx.tags.len(),
            "collector_started"
        );
        self.broadcast_status(&ctx.device, kind, "running", None).await;
        Ok(Collector {
            ctx,
            fingerprint,
            cancel,
            task,
            started_at_ms: now_epoch_ms(),
        })
    }

    /// 取消并等待采集单元结束后断开连接；返回后该设备不再产生读数。
    async fn shutdown_collector(&self, collector: Collector) {
        collector.cancel.cancel();
        if let Some(task) = collector.task {
            if let Err(err) = task.await {
                warn!(
                    target: "scada.collector",
                    device_id = %collector.ctx.device.device_id,
                    error = %err,
                    "collector_task_join_failed"
                );
            }
        }
        let kind = collector.ctx.transport;
        self.inner
            .adapters
            .get(kind)
            .disconnect(&collector.ctx.device.device_id)
            .await;
        info!(
            target: "scada.collector",
            device_id = %collector.ctx.device.device_id,
            "collector_stopped"
        );
        self.broadcast_status(&collector.ctx.device, kind, "stopped", None)
            .await;
    }

    async fn broadcast_status(
        &self,
        device: &DeviceRecord,
        kind: TransportKind,
        status: &str,
        message: Option<String>,
    ) {
        let frame = OutboundFrame::for_project(
            FrameType::DeviceStatus,
            device.project_id.clone(),
            serde_json::json!({
                "deviceId": device.device_id,
                "name": device.name,
                "transport": kind,
                "status": status,
                "message": message,
            }),
        );
        self.inner
            .broadcaster
            .broadcast(&device.project_id, frame)
            .await;
    }

    fn run_info(&self, collector: &Collector) -> DeviceRunInfo {
        let ctx = &collector.ctx;
        DeviceRunInfo {
            device_id: ctx.device.device_id.clone(),
            name: ctx.device.name.clone(),
            project_id: ctx.device.project_id.clone(),
            transport: ctx.transport,
            state: self
                .inner
                .adapters
                .get(ctx.transport)
                .status(&ctx.device.device_id)
                .as_str()
                .to_string(),
            started_at_ms: collector.started_at_ms,
            last_activity_ms: ctx.last_activity_ms(),
            tag_count: ctx.tags.len(),
        }
    }

    fn insert_collector(&self, collector: Collector) {
        if let Ok(mut map) = self.inner.collectors.lock() {
            map.insert(collector.ctx.device.device_id.clone(), collector);
        }
    }

    fn take_collector(&self, device_id: &str) -> Option<Collector> {
        self.inner
            .collectors
            .lock()
            .ok()
            .and_then(|mut map| map.remove(device_id))
    }

    fn collector_fingerprint(&self, device_id: &str) -> Option<u64> {
        self.inner
            .collectors
            .lock()
            .ok()
            .and_then(|map| map.get(device_id).map(|collector| collector.fingerprint))
    }

    fn collector_ids(&self) -> Vec<String> {
        self.inner
            .collectors
            .lock()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }
}

static UNENCODABLE_FINGERPRINTS: AtomicU64 = AtomicU64::new(0);

/// 设备与点位配置指纹；任一字段变化都需要重建采集器。
fn fingerprint(device: &DeviceRecord, tags: &[TagRecord]) -> u64 {
    fingerprint_encoded(&device.device_id, serde_json::to_string(&(device, tags)))
}

/// 配置无法编码时返回一次性指纹，每轮对账都会重建该设备的采集器。
fn fingerprint_encoded(device_id: &str, encoded: Result<String, serde_json::Error>) -> u64 {
    let mut hasher = DefaultHasher::new();
    match encoded {
        Ok(encoded) => encoded.hash(&mut hasher),
        Err(err) => {
            warn!(target: "scada.collector", device_id, error = %err, "device_fingerprint_failed");
            let nonce = UNENCODABLE_FINGERPRINTS.fetch_add(1, Ordering::Relaxed);
            ("unencodable", device_id, nonce).hash(&mut hasher);
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_error() -> serde_json::Error {
        match serde_json::from_str::<serde_json::Value>("{") {
            Err(err) => err,
            Ok(value) => panic!("unexpected value {value}"),
        }
    }

    #[test]
    fn fingerprint_is_stable_for_same_config() {
        let a = fingerprint_encoded("device-1", Ok("{\"a\":1}".to_string()));
        let b = fingerprint_encoded("device-1", Ok("{\"a\":1}".to_string()));
        let c = fingerprint_encoded("device-1", Ok("{\"a\":2}".to_string()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn unencodable_config_never_matches() {
        let first = fingerprint_encoded("device-1", Err(encode_error()));
        let second = fingerprint_encoded("device-1", Err(encode_error()));
        assert_ne!(first, second);
        assert_ne!(first, fingerprint_encoded("device-1", Ok(String::new())));
    }
}
