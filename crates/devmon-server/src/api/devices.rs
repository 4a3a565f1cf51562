use crate::api::{error_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::{Local, Utc};
use devmon_alert::engine::SwitchEdge;
use devmon_common::types::{
    parse_lenient_f64, DeviceInfo, DeviceReport, DeviceType, NotificationKind, RainKind,
};
use devmon_storage::DeviceRegistry;
use serde::{Deserialize, Serialize};

/// A device event that does not arrive as a sensor report.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// On/off transition. `level` is set for dimmers and selectors.
    Switch {
        on: bool,
        #[serde(default)]
        level: Option<i32>,
    },
    Value { value: i64 },
    AlertText { text: String },
    /// Caller-supplied message for the rules of one kind.
    Message { kind: String, message: String },
}

#[derive(Serialize)]
struct Dispatched {
    dispatched: usize,
}

#[derive(Serialize)]
struct DeviceSaved {
    id: u64,
}

pub async fn upsert_device(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(device): Json<DeviceInfo>,
) -> Response {
    if device.name.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "device name must not be empty",
        );
    }
    if let Err(e) = state.store.upsert_device(&device) {
        tracing::error!(trace_id = %trace_id, device_id = device.id, error = %e, "Failed to save device");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &trace_id,
            "storage_error",
            "failed to save device",
        );
    }
    // Stale-update rules carry the device name and last report time.
    state.cache.reload();
    tracing::info!(trace_id = %trace_id, device_id = device.id, name = %device.name, "Device saved");
    success_response(StatusCode::OK, &trace_id, DeviceSaved { id: device.id })
}

/// Runs a raw device report through the rule engine.
pub async fn submit_report(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(report): Json<DeviceReport>,
) -> Response {
    let Some(device_id) = report.row_id else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "report has no device row id",
        );
    };

    let now = Utc::now();
    if let Err(e) = state.store.touch_device(device_id, now) {
        tracing::error!(trace_id = %trace_id, device_id, error = %e, "Failed to stamp device report time");
    }

    let dispatched = state.engine.handle_report(&report).await;

    if report.device == DeviceType::Rain(RainKind::Counter) {
        if let Some(total) = report.fields().get(1).map(|f| parse_lenient_f64(f)) {
            if let Err(e) = state
                .store
                .record_rain_total(device_id, total, now.with_timezone(&Local).date_naive())
            {
                tracing::error!(trace_id = %trace_id, device_id, error = %e, "Failed to record rain total");
            }
        }
    }

    tracing::debug!(trace_id = %trace_id, device_id, dispatched, "Report processed");
    success_response(StatusCode::OK, &trace_id, Dispatched { dispatched })
}

pub async fn submit_event(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(device_id): Path<u64>,
    Json(event): Json<DeviceEvent>,
) -> Response {
    let device = match state.store.device_info(device_id) {
        Ok(Some(device)) => device,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "device not found",
            );
        }
        Err(e) => {
            tracing::error!(trace_id = %trace_id, device_id, error = %e, "Failed to read device");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "failed to read device",
            );
        }
    };

    let now = Utc::now();
    if let Err(e) = state.store.touch_device(device_id, now) {
        tracing::error!(trace_id = %trace_id, device_id, error = %e, "Failed to stamp device report time");
    }
    state.cache.touch_device_update(device_id, now);

    let engine = &state.engine;
    let dispatched = match event {
        DeviceEvent::Switch { on, level } => {
            let edge = if on { SwitchEdge::On } else { SwitchEdge::Off };
            match level {
                Some(level) => engine.check_switch_level(device_id, edge, level).await,
                None => engine.check_switch(device_id, edge).await,
            }
        }
        DeviceEvent::Value { value } => engine.check_value(device_id, &device.name, value).await,
        DeviceEvent::AlertText { text } => {
            engine.check_alert_text(device_id, &device.name, &text).await
        }
        DeviceEvent::Message { kind, message } => {
            let kind: NotificationKind = match kind.parse() {
                Ok(kind) => kind,
                Err(e) => {
                    return error_response(StatusCode::BAD_REQUEST, &trace_id, "unknown_kind", &e);
                }
            };
            engine.check_event(device_id, kind, &message).await
        }
    };

    success_response(StatusCode::OK, &trace_id, Dispatched { dispatched })
}
