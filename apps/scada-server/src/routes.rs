//! 路由定义
//!
//! - 健康检查：/health
//! - 实时推送：/ws
//! - 采集管理：/api/admin/collector/*、/api/admin/devices/*
//! - 链路计数：/api/admin/metrics

use super::AppState;
use super::handlers::*;
use super::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// 创建完整路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .nest("/api/admin", create_admin_router())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_context))
        .with_state(state)
}

/// 管理接口路由（全部要求 bearer token）
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/collector/start", post(start_collector))
        .route("/collector/stop", post(stop_collector))
        .route("/collector/scan", post(scan_collector))
        .route("/collector/statistics", get(collector_statistics))
        .route("/collector/devices", get(collector_devices))
        .route("/devices/:device_id/start", post(start_device))
        .route("/devices/:device_id/stop", post(stop_device))
        .route("/devices/:device_id/probe", get(probe_device))
        .route("/metrics", get(get_metrics))
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::AppState;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
    };
    use domain::{Identity, ValueKind};
    use http_body_util::BodyExt;
    use scada_alarm::AlarmEvaluator;
    use scada_auth::JwtManager;
    use scada_collector::{CollectorConfig, CollectorRegistry};
    use scada_protocol::AdapterSet;
    use scada_realtime::RealtimeHub;
    use scada_storage::{
        DeviceRecord, InMemoryAlarmStore, InMemoryDeviceStore, InMemoryMeasurementStore,
        TagRecord,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        registry: CollectorRegistry,
        token: String,
    }

    fn test_app(devices: Arc<InMemoryDeviceStore>) -> TestApp {
        let jwt = Arc::new(JwtManager::new("test-secret".to_string(), 3600));
        let token = jwt
            .issue_access_token(&Identity::new("u-1", "Operator", vec!["admin".to_string()]))
            .expect("token");
        let hub = Arc::new(RealtimeHub::new(jwt.clone()));
        let evaluator = Arc::new(AlarmEvaluator::new(
            Arc::new(InMemoryAlarmStore::new()),
            hub.clone(),
        ));
        let registry = CollectorRegistry::new(
            devices.clone(),
            devices,
            Arc::new(InMemoryMeasurementStore::new()),
            AdapterSet::default(),
            evaluator.clone(),
            hub.clone(),
            CollectorConfig {
                scan_interval: Duration::from_secs(3600),
                default_poll_interval: Duration::from_millis(50),
                ..CollectorConfig::default()
            },
        );
        let state = AppState::new(jwt, hub, registry.clone(), evaluator);
        TestApp {
            router: create_router(state),
            registry,
            token,
        }
    }

    fn simulator(devices: &InMemoryDeviceStore, device_id: &str) {
        devices
            .upsert_device(DeviceRecord {
                device_id: device_id.to_string(),
                project_id: "p-1".to_string(),
                name: "simulator".to_string(),
                transport: "generator".to_string(),
                connection: serde_json::json!({}),
                enabled: true,
            })
            .expect("device");
        devices
            .upsert_tag(TagRecord {
                tag_id: format!("{device_id}-t1"),
                device_id: device_id.to_string(),
                name: "temperature".to_string(),
                address: "temperature".to_string(),
                value_kind: ValueKind::default(),
                scaling: None,
                deadband: 0.0,
                unit: Some("C".to_string()),
                interval_ms: Some(50),
                options: Some(serde_json::json!({ "pattern": "constant", "value": 21.5 })),
            })
            .expect("tag");
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn health_is_public_and_carries_request_ids() {
        let app = test_app(Arc::new(InMemoryDeviceStore::new()));
        let response = app
            .router
            .oneshot(request("GET", "/health", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = body_json(response).await;
        assert_eq!(body["data"]["ok"], true);
        assert_eq!(body["data"]["collectorRunning"], false);
        assert_eq!(body["data"]["wsClients"], 0);
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let app = test_app(Arc::new(InMemoryDeviceStore::new()));
        let response = app
            .router
            .clone()
            .oneshot(request("GET", "/api/admin/collector/statistics", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .router
            .oneshot(request(
                "GET",
                "/api/admin/collector/statistics",
                Some("not-a-jwt"),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn statistics_and_metrics_with_token() {
        let app = test_app(Arc::new(InMemoryDeviceStore::new()));
        let response = app
            .router
            .clone()
            .oneshot(request(
                "GET",
                "/api/admin/collector/statistics",
                Some(&app.token),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["running"], false);
        assert_eq!(body["data"]["activeDevices"], 0);

        let response = app
            .router
            .oneshot(request("GET", "/api/admin/metrics", Some(&app.token)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["data"]["wsHandshakeRejected"].is_u64());
    }

    #[tokio::test]
    async fn device_errors_map_to_status_codes() {
        let devices = Arc::new(InMemoryDeviceStore::new());
        devices
            .upsert_device(DeviceRecord {
                device_id: "d-empty".to_string(),
                project_id: "p-1".to_string(),
                name: "no tags".to_string(),
                transport: "generator".to_string(),
                connection: serde_json::json!({}),
                enabled: true,
            })
            .expect("device");
        let app = test_app(devices);

        let response = app
            .router
            .clone()
            .oneshot(request(
                "POST",
                "/api/admin/devices/missing/start",
                Some(&app.token),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .router
            .oneshot(request(
                "POST",
                "/api/admin/devices/d-empty/start",
                Some(&app.token),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "DEVICE.NOT_CONFIGURED");
    }

    #[tokio::test]
    async fn device_start_and_stop_round() {
        let devices = Arc::new(InMemoryDeviceStore::new());
        simulator(&devices, "d-1");
        let app = test_app(devices);

        let response = app
            .router
            .clone()
            .oneshot(request("POST", "/api/admin/devices/d-1/start", Some(&app.token)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["deviceId"], "d-1");
        assert_eq!(body["data"]["tagCount"], 1);
        assert_eq!(app.registry.collector_count(), 1);

        let response = app
            .router
            .clone()
            .oneshot(request("GET", "/api/admin/collector/devices", Some(&app.token)))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

        let response = app
            .router
            .clone()
            .oneshot(request("POST", "/api/admin/devices/d-1/stop", Some(&app.token)))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["data"]["stopped"], true);
        assert_eq!(app.registry.collector_count(), 0);

        let response = app
            .router
            .oneshot(request("POST", "/api/admin/devices/d-1/stop", Some(&app.token)))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["data"]["stopped"], false);
    }

    #[tokio::test]
    async fn collector_start_twice_conflicts() {
        let devices = Arc::new(InMemoryDeviceStore::new());
        simulator(&devices, "d-1");
        let app = test_app(devices);

        let response = app
            .router
            .clone()
            .oneshot(request("POST", "/api/admin/collector/start", Some(&app.token)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["started"], serde_json::json!(["d-1"]));

        let response = app
            .router
            .clone()
            .oneshot(request("POST", "/api/admin/collector/start", Some(&app.token)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .router
            .oneshot(request("POST", "/api/admin/collector/stop", Some(&app.token)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!app.registry.is_running().await);
        assert_eq!(app.registry.collector_count(), 0);
    }
}
