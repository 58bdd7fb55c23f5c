//! 健康检查与实时链路计数。
//!
//! - GET /health
//! - GET /api/admin/metrics

use api_contract::{HealthDto, MetricsSnapshotDto};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Response,
};
use scada_telemetry::metrics;

use crate::AppState;
use crate::middleware::require_identity;
use crate::utils::response::ok;

pub async fn health(State(state): State<AppState>) -> Response {
    ok(HealthDto {
        ok: true,
        collector_running: state.registry.is_running().await,
        ws_clients: state.hub.client_count().await,
    })
}

pub async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_identity(&state, &headers) {
        return response;
    }

    let snapshot = metrics().snapshot();
    ok(MetricsSnapshotDto {
        ws_connections_opened: snapshot.ws_connections_opened,
        ws_connections_closed: snapshot.ws_connections_closed,
        ws_handshake_rejected: snapshot.ws_handshake_rejected,
        ws_clients_evicted: snapshot.ws_clients_evicted,
        frames_delivered: snapshot.frames_delivered,
        frames_failed: snapshot.frames_failed,
        inbound_ignored: snapshot.inbound_ignored,
        alarm_triggered: snapshot.alarm_triggered,
        alarm_cleared: snapshot.alarm_cleared,
        alarm_acknowledged: snapshot.alarm_acknowledged,
    })
}
