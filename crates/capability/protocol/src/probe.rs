//! 连通性探测
//!
//! TCP 建连测时延，超时由 `tokio::time::timeout` 约束；探测结果按失败原因分类。

use crate::types::{ProbeFailure, ProbeResult, ProbeSettings};
use std::io;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// 探测 `host:port` 是否可建立 TCP 连接。
pub async fn probe_tcp(host: &str, port: u16, settings: &ProbeSettings) -> ProbeResult {
    if host.trim().is_empty() || port == 0 {
        return ProbeResult::failed(ProbeFailure::InvalidConfig, "host and port are required");
    }
    let started = Instant::now();
    let result = match timeout(settings.timeout, TcpStream::connect((host, port))).await {
        Err(_) => ProbeResult::failed(
            ProbeFailure::Timeout,
            format!("no response within {} ms", settings.timeout.as_millis()),
        ),
        Ok(Err(err)) => ProbeResult::failed(classify_io_error(&err), err.to_string()),
        Ok(Ok(stream)) => {
            drop(stream);
            let elapsed = started.elapsed();
            let latency_ms = elapsed.as_millis() as u64;
            if elapsed > settings.degraded_threshold {
                ProbeResult::degraded(latency_ms, settings.degraded_threshold.as_millis() as u64)
            } else {
                ProbeResult::reachable(latency_ms)
            }
        }
    };
    debug!(
        target: "scada.protocol",
        host,
        port,
        connected = result.connected,
        failure = ?result.failure,
        "probe_finished"
    );
    result
}

/// IO 错误到探测失败分类的映射。
pub fn classify_io_error(err: &io::Error) -> ProbeFailure {
    match err.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => ProbeFailure::Refused,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProbeFailure::Timeout,
        io::ErrorKind::InvalidInput => ProbeFailure::InvalidConfig,
        // DNS 失败、网络/主机不可达
        _ => ProbeFailure::HostUnreachable,
    }
}
