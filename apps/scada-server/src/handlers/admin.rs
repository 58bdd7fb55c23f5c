//! 采集管理 handlers
//!
//! - POST /api/admin/collector/start
//! - POST /api/admin/collector/stop
//! - POST /api/admin/collector/scan
//! - GET  /api/admin/collector/statistics
//! - GET  /api/admin/collector/devices
//! - POST /api/admin/devices/{id}/start
//! - POST /api/admin/devices/{id}/stop
//! - GET  /api/admin/devices/{id}/probe

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use serde_json::json;
use tracing::info;

use crate::AppState;
use crate::middleware::require_identity;
use crate::utils::response::{collector_error, ok};

#[derive(serde::Deserialize)]
pub struct DevicePath {
    pub(crate) device_id: String,
}

pub async fn start_collector(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = match require_identity(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match state.registry.start().await {
        Ok(report) => {
            info!(target: "scada.collector", user_id = %identity.user_id, "collector_started_by_admin");
            ok(report)
        }
        Err(err) => collector_error(err),
    }
}

pub async fn stop_collector(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = match require_identity(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    state.registry.stop().await;
    info!(target: "scada.collector", user_id = %identity.user_id, "collector_stopped_by_admin");
    ok(json!({ "stopped": true }))
}

pub async fn scan_collector(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_identity(&state, &headers) {
        return response;
    }
    match state.registry.scan_and_reconcile().await {
        Ok(report) => ok(report),
        Err(err) => collector_error(err),
    }
}

pub async fn collector_statistics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_identity(&state, &headers) {
        return response;
    }
    ok(state.registry.get_statistics().await)
}

pub async fn collector_devices(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_identity(&state, &headers) {
        return response;
    }
    ok(state.registry.get_device_status())
}

pub async fn start_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = require_identity(&state, &headers) {
        return response;
    }
    match state.registry.start_device(&path.device_id).await {
        Ok(info) => ok(info),
        Err(err) => collector_error(err),
    }
}

pub async fn stop_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = require_identity(&state, &headers) {
        return response;
    }
    let stopped = state.registry.stop_device(&path.device_id).await;
    ok(json!({ "deviceId": path.device_id, "stopped": stopped }))
}

pub async fn probe_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = require_identity(&state, &headers) {
        return response;
    }
    match state.registry.probe_device(&path.device_id).await {
        Ok(result) => ok(result),
        Err(err) => collector_error(err),
    }
}
