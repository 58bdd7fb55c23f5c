use scada_config::{AppConfig, ConfigError};

// 环境变量是进程级状态，所有断言放在同一个测试里顺序执行。
#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::remove_var("SCADA_DATABASE_URL");
        std::env::set_var("SCADA_JWT_SECRET", "secret");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Missing(key)) if key == "SCADA_DATABASE_URL"
    ));

    unsafe {
        std::env::set_var("SCADA_DATABASE_URL", "postgres://scada@localhost/scada");
        std::env::set_var("SCADA_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("SCADA_SCAN_INTERVAL_SECONDS", "15");
    }
    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.scan_interval_seconds, 15);
    assert_eq!(config.heartbeat_interval_seconds, 30);
    assert_eq!(config.connect_max_attempts, 3);
    assert_eq!(config.connect_backoff_base_ms, 1000);
    assert_eq!(config.connect_backoff_max_ms, 10_000);
    assert_eq!(config.probe_timeout_ms, 5000);
    assert!(config.collector_autostart);

    unsafe {
        std::env::set_var("SCADA_HEARTBEAT_INTERVAL_SECONDS", "0");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "SCADA_HEARTBEAT_INTERVAL_SECONDS"
    ));

    unsafe {
        std::env::remove_var("SCADA_HEARTBEAT_INTERVAL_SECONDS");
        std::env::set_var("SCADA_COLLECTOR_AUTOSTART", "off");
    }
    let config = AppConfig::from_env().expect("config");
    assert!(!config.collector_autostart);
}
