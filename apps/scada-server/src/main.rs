//! SCADA 实时引擎服务：采集注册表、告警评估、实时推送中心与管理接口的装配入口。

mod bridge;
mod handlers;
mod middleware;
mod routes;
mod utils;

use bridge::ScadaBridge;
use scada_alarm::AlarmEvaluator;
use scada_auth::{IdentityVerifier, JwtManager};
use scada_collector::{CollectorConfig, CollectorRegistry, RetryPolicy};
use scada_config::AppConfig;
use scada_protocol::{AdapterSet, ProbeSettings};
use scada_realtime::{HubCallbacks, RealtimeHub};
use scada_storage::{PgAlarmStore, PgDeviceStore, PgMeasurementStore, PgTagStore, connect_pool};
use scada_telemetry::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub hub: Arc<RealtimeHub>,
    pub registry: CollectorRegistry,
    pub callbacks: Arc<dyn HubCallbacks>,
}

impl AppState {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        hub: Arc<RealtimeHub>,
        registry: CollectorRegistry,
        evaluator: Arc<AlarmEvaluator>,
    ) -> Self {
        let callbacks: Arc<dyn HubCallbacks> =
            Arc::new(ScadaBridge::new(registry.clone(), evaluator));
        Self {
            verifier,
            hub,
            registry,
            callbacks,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // 存储：设备/点位/告警规则只读，测量值与告警状态、事件写入
    let pool = connect_pool(&config.database_url).await?;
    let device_store = Arc::new(PgDeviceStore::new(pool.clone()));
    let tag_store = Arc::new(PgTagStore::new(pool.clone()));
    let measurement_store = Arc::new(PgMeasurementStore::new(pool.clone()));
    let alarm_store = Arc::new(PgAlarmStore::new(pool));

    let jwt = Arc::new(JwtManager::new(
        config.jwt_secret.clone(),
        config.jwt_access_ttl_seconds,
    ));
    let hub = Arc::new(RealtimeHub::new(jwt.clone()));
    let evaluator = Arc::new(AlarmEvaluator::new(alarm_store, hub.clone()));

    let adapters = AdapterSet::new(ProbeSettings {
        timeout: Duration::from_millis(config.probe_timeout_ms),
        degraded_threshold: Duration::from_millis(config.probe_degraded_ms),
    });
    let registry = CollectorRegistry::new(
        device_store,
        tag_store,
        measurement_store,
        adapters,
        evaluator.clone(),
        hub.clone(),
        CollectorConfig {
            scan_interval: config.scan_interval(),
            default_poll_interval: Duration::from_millis(config.default_poll_interval_ms),
            retry: RetryPolicy {
                max_attempts: config.connect_max_attempts,
                base_delay: Duration::from_millis(config.connect_backoff_base_ms),
                max_delay: Duration::from_millis(config.connect_backoff_max_ms),
            },
        },
    );
    let state = AppState::new(jwt, hub.clone(), registry.clone(), evaluator);

    hub.start_heartbeat(config.heartbeat_interval()).await;
    if config.collector_autostart {
        if let Err(err) = registry.start().await {
            error!(target: "scada.collector", error = %err, "collector_autostart_failed");
        }
    }

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "scada_server_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 先停采集，保证关闭连接后不再有推送
    registry.stop().await;
    hub.shutdown().await;
    info!("scada_server_stopped");
    Ok(())
}

/// 等待 Ctrl-C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("shutdown_signal_sigint"),
        () = terminate => info!("shutdown_signal_sigterm"),
    }
}
