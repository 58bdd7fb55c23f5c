//! 采集单元：每个设备一个。
//!
//! - Modbus：一个轮询任务，按设备轮询周期依次读取全部点位
//! - MQTT：每个点位一个订阅，消息由适配器的设备事件循环顺序回调
//! - Generator：一个调度任务，用最小堆驱动全部点位各自的周期

use async_trait::async_trait;
use domain::{TransportKind, now_epoch_ms};
use scada_protocol::{
    GeneratorOptions, ModbusTcpAdapter, MqttAdapter, PushHandler, TagScheduler,
};
use scada_storage::{DeviceRecord, TagRecord};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::processor::ReadingProcessor;

/// 采集单元共享的设备上下文
pub(crate) struct DeviceContext {
    pub(crate) device: DeviceRecord,
    pub(crate) transport: TransportKind,
    pub(crate) tags: Vec<TagRecord>,
    processor: Arc<ReadingProcessor>,
    /// 0 表示尚无读数
    last_activity_ms: AtomicI64,
}

impl DeviceContext {
    pub(crate) fn new(
        device: DeviceRecord,
        transport: TransportKind,
        tags: Vec<TagRecord>,
        processor: Arc<ReadingProcessor>,
    ) -> Self {
        Self {
            device,
            transport,
            tags,
            processor,
            last_activity_ms: AtomicI64::new(0),
        }
    }

    pub(crate) fn last_activity_ms(&self) -> Option<i64> {
        match self.last_activity_ms.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }

    async fn handle_reading(&self, tag: &TagRecord, raw: f64, ts_ms: i64) {
        self.last_activity_ms.store(ts_ms, Ordering::Relaxed);
        self.processor
            .process(&self.device, self.transport, tag, raw, ts_ms)
            .await;
    }

    fn handle_read_error(&self, tag: &TagRecord, err: &dyn std::fmt::Display) {
        self.processor.record_read_error();
        warn!(
            target: "scada.collector",
            device_id = %self.device.device_id,
            tag_id = %tag.tag_id,
            error = %err,
            "tag_read_failed"
        );
    }
}

/// Modbus 轮询任务
pub(crate) fn spawn_modbus_poll(
    ctx: Arc<DeviceContext>,
    adapter: Arc<ModbusTcpAdapter>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            for tag in &ctx.tags {
                let read = adapter.read(&ctx.device.device_id, &ctx.device.connection, &tag.address);
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = read => result,
                };
                match result {
                    Ok(raw) => ctx.handle_reading(tag, raw, now_epoch_ms()).await,
                    Err(err) => ctx.handle_read_error(tag, &err),
                }
            }
        }
        debug!(target: "scada.collector", device_id = %ctx.device.device_id, "modbus_poll_stopped");
    })
}

/// MQTT 推送回调：采集器停止后不再处理
struct TagPushHandler {
    ctx: Arc<DeviceContext>,
    tag_index: usize,
    cancel: CancellationToken,
}

#[async_trait]
impl PushHandler for TagPushHandler {
    async fn handle(&self, _topic: &str, value: f64, received_at_ms: i64) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(tag) = self.ctx.tags.get(self.tag_index) {
            self.ctx.handle_reading(tag, value, received_at_ms).await;
        }
    }
}

/// 为每个点位订阅其主题；单个点位订阅失败只记录。
pub(crate) async fn subscribe_mqtt(
    ctx: Arc<DeviceContext>,
    adapter: &MqttAdapter,
    cancel: &CancellationToken,
) -> usize {
    let mut subscribed = 0;
    for (tag_index, tag) in ctx.tags.iter().enumerate() {
        let handler = Arc::new(TagPushHandler {
            ctx: ctx.clone(),
            tag_index,
            cancel: cancel.clone(),
        });
        match adapter
            .subscribe(&ctx.device.device_id, &tag.address, handler)
            .await
        {
            Ok(()) => subscribed += 1,
            Err(err) => ctx.handle_read_error(tag, &err),
        }
    }
    subscribed
}

/// 发生器调度任务；点位参数无效时跳过该点位。
pub(crate) fn spawn_generator(
    ctx: Arc<DeviceContext>,
    default_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut sources: Vec<(usize, GeneratorOptions)> = Vec::new();
    let mut intervals = Vec::new();
    for (index, tag) in ctx.tags.iter().enumerate() {
        match GeneratorOptions::from_value(tag.options.as_ref()) {
            Ok(options) => {
                sources.push((index, options));
                intervals.push(
                    tag.interval_ms
                        .unwrap_or(default_interval.as_millis() as u64),
                );
            }
            Err(err) => ctx.handle_read_error(tag, &err),
        }
    }

    tokio::spawn(async move {
        let mut scheduler = TagScheduler::new(&intervals, now_epoch_ms());
        if scheduler.is_empty() {
            warn!(target: "scada.collector", device_id = %ctx.device.device_id, "generator_has_no_valid_tags");
            return;
        }
        while let Some(due_ms) = scheduler.next_due() {
            let wait = (due_ms - now_epoch_ms()).max(0) as u64;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(wait)) => {}
            }
            let now_ms = now_epoch_ms();
            for slot in scheduler.pop_due(now_ms) {
                if cancel.is_cancelled() {
                    return;
                }
                let (tag_index, options) = &sources[slot];
                let tag = &ctx.tags[*tag_index];
                ctx.handle_reading(tag, options.sample(now_ms), now_ms).await;
            }
        }
        debug!(target: "scada.collector", device_id = %ctx.device.device_id, "generator_stopped");
    })
}
