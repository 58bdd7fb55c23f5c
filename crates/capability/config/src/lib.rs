//! 应用运行配置加载。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_access_ttl_seconds: u64,
    pub scan_interval_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub connect_max_attempts: u32,
    pub connect_backoff_base_ms: u64,
    pub connect_backoff_max_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_degraded_ms: u64,
    pub default_poll_interval_ms: u64,
    pub collector_autostart: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = read_required("SCADA_DATABASE_URL")?;
        let jwt_secret = read_required("SCADA_JWT_SECRET")?;
        let http_addr =
            env::var("SCADA_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let jwt_access_ttl_seconds = read_u64_with_default("SCADA_JWT_ACCESS_TTL_SECONDS", 3600)?;
        let scan_interval_seconds = read_positive_u64("SCADA_SCAN_INTERVAL_SECONDS", 30)?;
        let heartbeat_interval_seconds =
            read_positive_u64("SCADA_HEARTBEAT_INTERVAL_SECONDS", 30)?;
        let connect_max_attempts = read_positive_u64("SCADA_CONNECT_MAX_ATTEMPTS", 3)?;
        let connect_max_attempts = u32::try_from(connect_max_attempts).map_err(|_| {
            ConfigError::Invalid(
                "SCADA_CONNECT_MAX_ATTEMPTS".to_string(),
                connect_max_attempts.to_string(),
            )
        })?;
        let connect_backoff_base_ms = read_u64_with_default("SCADA_CONNECT_BACKOFF_BASE_MS", 1000)?;
        let connect_backoff_max_ms = read_u64_with_default("SCADA_CONNECT_BACKOFF_MAX_MS", 10_000)?;
        if connect_backoff_max_ms < connect_backoff_base_ms {
            return Err(ConfigError::Invalid(
                "SCADA_CONNECT_BACKOFF_MAX_MS".to_string(),
                connect_backoff_max_ms.to_string(),
            ));
        }
        let probe_timeout_ms = read_positive_u64("SCADA_PROBE_TIMEOUT_MS", 5000)?;
        let probe_degraded_ms = read_positive_u64("SCADA_PROBE_DEGRADED_MS", 1000)?;
        let default_poll_interval_ms = read_positive_u64("SCADA_DEFAULT_POLL_INTERVAL_MS", 1000)?;
        let collector_autostart = read_bool_with_default("SCADA_COLLECTOR_AUTOSTART", true);

        Ok(Self {
            http_addr,
            database_url,
            jwt_secret,
            jwt_access_ttl_seconds,
            scan_interval_seconds,
            heartbeat_interval_seconds,
            connect_max_attempts,
            connect_backoff_base_ms,
            connect_backoff_max_ms,
            probe_timeout_ms,
            probe_degraded_ms,
            default_poll_interval_ms,
            collector_autostart,
        })
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }
}

fn read_required(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key.to_string())),
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 周期类配置不允许为 0。
fn read_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = read_u64_with_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(key.to_string(), value.to_string()));
    }
    Ok(value)
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
