//! 追踪、请求 ID 生成与实时链路计数。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub ws_connections_opened: u64,
    pub ws_connections_closed: u64,
    pub ws_handshake_rejected: u64,
    pub ws_clients_evicted: u64,
    pub frames_delivered: u64,
    pub frames_failed: u64,
    pub inbound_ignored: u64,
    pub alarm_triggered: u64,
    pub alarm_cleared: u64,
    pub alarm_acknowledged: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    ws_connections_opened: AtomicU64,
    ws_connections_closed: AtomicU64,
    ws_handshake_rejected: AtomicU64,
    ws_clients_evicted: AtomicU64,
    frames_delivered: AtomicU64,
    frames_failed: AtomicU64,
    inbound_ignored: AtomicU64,
    alarm_triggered: AtomicU64,
    alarm_cleared: AtomicU64,
    alarm_acknowledged: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            ws_connections_opened: AtomicU64::new(0),
            ws_connections_closed: AtomicU64::new(0),
            ws_handshake_rejected: AtomicU64::new(0),
            ws_clients_evicted: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
            inbound_ignored: AtomicU64::new(0),
            alarm_triggered: AtomicU64::new(0),
            alarm_cleared: AtomicU64::new(0),
            alarm_acknowledged: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ws_connections_opened: self.ws_connections_opened.load(Ordering::Relaxed),
            ws_connections_closed: self.ws_connections_closed.load(Ordering::Relaxed),
            ws_handshake_rejected: self.ws_handshake_rejected.load(Ordering::Relaxed),
            ws_clients_evicted: self.ws_clients_evicted.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_failed: self.frames_failed.load(Ordering::Relaxed),
            inbound_ignored: self.inbound_ignored.load(Ordering::Relaxed),
            alarm_triggered: self.alarm_triggered.load(Ordering::Relaxed),
            alarm_cleared: self.alarm_cleared.load(Ordering::Relaxed),
            alarm_acknowledged: self.alarm_acknowledged.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录 WebSocket 客户端注册。
pub fn record_ws_connection_opened() {
    metrics()
        .ws_connections_opened
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录 WebSocket 客户端注销。
pub fn record_ws_connection_closed() {
    metrics()
        .ws_connections_closed
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录握手鉴权失败。
pub fn record_ws_handshake_rejected() {
    metrics()
        .ws_handshake_rejected
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录心跳驱逐。
pub fn record_ws_client_evicted() {
    metrics().ws_clients_evicted.fetch_add(1, Ordering::Relaxed);
}

/// 记录出站帧投递结果。
pub fn record_frames_delivered(count: u64) {
    metrics().frames_delivered.fetch_add(count, Ordering::Relaxed);
}

pub fn record_frame_failed() {
    metrics().frames_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录被忽略的入站帧（格式错误或未知类型）。
pub fn record_inbound_ignored() {
    metrics().inbound_ignored.fetch_add(1, Ordering::Relaxed);
}

pub fn record_alarm_triggered() {
    metrics().alarm_triggered.fetch_add(1, Ordering::Relaxed);
}

pub fn record_alarm_cleared() {
    metrics().alarm_cleared.fetch_add(1, Ordering::Relaxed);
}

pub fn record_alarm_acknowledged() {
    metrics().alarm_acknowledged.fetch_add(1, Ordering::Relaxed);
}
