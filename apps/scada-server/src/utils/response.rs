//! HTTP 响应辅助函数
//!
//! 所有错误返回统一的 ApiResponse 格式，HTTP 状态码与错误码对应。

use api_contract::ApiResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use scada_auth::AuthError;
use scada_collector::CollectorError;
use serde::Serialize;

/// 成功响应
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 认证错误响应
pub fn auth_error(status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()>::error(
            "AUTH.UNAUTHORIZED",
            "unauthorized",
        )),
    )
        .into_response()
}

/// 认证内部错误响应
pub fn internal_auth_error(err: AuthError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", err.to_string())),
    )
        .into_response()
}

/// 采集错误响应
pub fn collector_error(err: CollectorError) -> Response {
    let (status, code) = match &err {
        CollectorError::AlreadyRunning => (StatusCode::CONFLICT, "COLLECTOR.ALREADY_RUNNING"),
        CollectorError::NotFound(_) => (StatusCode::NOT_FOUND, "RESOURCE.NOT_FOUND"),
        CollectorError::NotConfigured(_) | CollectorError::Configuration(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "DEVICE.NOT_CONFIGURED")
        }
        CollectorError::Connection(_) => (StatusCode::BAD_GATEWAY, "DEVICE.CONNECTION_FAILED"),
        CollectorError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL.ERROR"),
    };
    (
        status,
        Json(ApiResponse::<()>::error(code, err.to_string())),
    )
        .into_response()
}
