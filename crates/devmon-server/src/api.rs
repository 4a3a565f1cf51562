pub mod devices;
pub mod notifications;

use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// Envelope wrapped around every API response.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// 0 on success.
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn success_empty_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: 0,
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "unauthorized" => 1002,
        "forbidden" => 1003,
        "not_found" => 1004,
        "conflict" => 1005,
        "unknown_kind" => 1101,
        "invalid_condition" => 1102,
        "unknown_channel" => 1103,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
    rule_count: usize,
    channel_count: usize,
}

async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
            rule_count: state.cache.all_rules().len(),
            channel_count: state.dispatcher.channels().channel_names().len(),
        },
    )
}

/// Routes open to any caller.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health))
        .route(
            "/v1/devices/{id}/notifications",
            get(notifications::list_device_notifications),
        )
        .route("/v1/reports", post(devices::submit_report))
        .route("/v1/devices/{id}/events", post(devices::submit_event))
}

/// Routes that change rules, devices or send messages. Require admin rights.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/devices/{id}/notifications",
            post(notifications::add_notification),
        )
        .route(
            "/v1/notifications/{id}",
            put(notifications::update_notification).delete(notifications::delete_notification),
        )
        .route("/v1/notifications/test", post(notifications::send_test))
        .route("/v1/devices", post(devices::upsert_device))
}
