use crate::api::{error_response, success_empty_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use devmon_alert::compare::Comparator;
use devmon_common::types::{join_custom_message, NewRule, NotificationKind, NotificationRule};
use devmon_notify::dispatcher::DispatchRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Editable fields of a rule, as submitted by rule editors.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleRequest {
    /// One-character kind tag, e.g. `"T"`.
    pub kind: String,
    /// Comparator code `0..=5`.
    #[serde(default)]
    pub when: u8,
    /// Threshold, as a number or string.
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub recovery: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub custom_message: String,
    #[serde(default)]
    pub custom_action: String,
    #[serde(default)]
    pub active_channels: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub send_always: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Serialize)]
struct DeviceNotifications {
    channels: Vec<String>,
    rules: Vec<NotificationRule>,
}

#[derive(Serialize)]
struct RuleCreated {
    device_id: u64,
    params: String,
}

#[derive(Debug, Deserialize)]
pub struct TestRequest {
    /// Restricts the test to these channels. Empty tests every channel.
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Serialize)]
struct TestResult {
    delivered: bool,
}

fn threshold_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => "0".to_string(),
        other => other.to_string(),
    }
}

/// Builds the stored params string.
///
/// Switch and dew point kinds carry no threshold, except switch-on with the
/// `=` code which matches a dimmer or selector level.
pub fn build_params(
    kind: NotificationKind,
    when: u8,
    value: &Value,
    recovery: bool,
) -> Result<String, (&'static str, String)> {
    match kind {
        NotificationKind::SwitchOn if when == 2 => Ok(format!("S;=;{}", threshold_text(value))),
        NotificationKind::SwitchOn | NotificationKind::SwitchOff | NotificationKind::DewPoint => {
            Ok(kind.tag().to_string())
        }
        _ => {
            let op = Comparator::from_code(when).ok_or_else(|| {
                (
                    "invalid_condition",
                    format!("condition code {when} is out of range 0..=5"),
                )
            })?;
            Ok(format!(
                "{};{op};{};{}",
                kind.tag(),
                threshold_text(value),
                if recovery { "1" } else { "0" }
            ))
        }
    }
}

/// Validates a request and turns it into a new rule for `device_id`.
fn to_new_rule(
    state: &AppState,
    device_id: u64,
    req: RuleRequest,
) -> Result<NewRule, (&'static str, String)> {
    let kind: NotificationKind = req
        .kind
        .parse()
        .map_err(|e: String| ("unknown_kind", e))?;
    let params = build_params(kind, req.when, &req.value, req.recovery)?;

    let known = state.dispatcher.channels().channel_names();
    if let Some(unknown) = req.active_channels.iter().find(|c| !known.contains(c)) {
        return Err((
            "unknown_channel",
            format!("notification channel '{unknown}' is not configured"),
        ));
    }

    Ok(NewRule {
        device_id,
        active: req.active,
        params,
        custom_message: req.custom_message,
        custom_action: req.custom_action,
        active_channels: req.active_channels,
        priority: req.priority,
        send_always: req.send_always,
    })
}

/// True if another rule of the device already has these params.
fn is_duplicate(state: &AppState, rule: &NewRule, except: Option<u64>) -> bool {
    state
        .cache
        .rules(rule.device_id, false)
        .iter()
        .any(|r| r.params == rule.params && Some(r.id) != except)
}

pub async fn list_device_notifications(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(device_id): Path<u64>,
) -> impl IntoResponse {
    success_response(
        StatusCode::OK,
        &trace_id,
        DeviceNotifications {
            channels: state.dispatcher.channels().channel_names(),
            rules: state.cache.rules(device_id, false),
        },
    )
}

pub async fn add_notification(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(device_id): Path<u64>,
    Json(req): Json<RuleRequest>,
) -> Response {
    let rule = match to_new_rule(&state, device_id, req) {
        Ok(rule) => rule,
        Err((code, msg)) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, code, &msg);
        }
    };
    if is_duplicate(&state, &rule, None) {
        return error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "conflict",
            "an identical notification already exists for this device",
        );
    }

    let created = RuleCreated {
        device_id,
        params: rule.params.clone(),
    };
    if !state.cache.add(rule) {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &trace_id,
            "storage_error",
            "failed to store notification",
        );
    }
    tracing::info!(trace_id = %trace_id, device_id, params = %created.params, "Notification added");
    success_response(StatusCode::CREATED, &trace_id, created)
}

/// Replaces a rule. An armed recovery survives the edit when recovery
/// stays enabled, so a pending recovery message is not lost.
pub async fn update_notification(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(rule_id): Path<u64>,
    Json(req): Json<RuleRequest>,
) -> Response {
    let Some(existing) = state.cache.rule(rule_id) else {
        return error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "notification not found",
        );
    };

    let recovery = req.recovery;
    let mut rule = match to_new_rule(&state, existing.device_id, req) {
        Ok(rule) => rule,
        Err((code, msg)) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, code, &msg);
        }
    };
    if is_duplicate(&state, &rule, Some(rule_id)) {
        return error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "conflict",
            "updated notification duplicates an existing one",
        );
    }
    if recovery {
        if let Some(armed) = state.cache.peek_recovery(rule_id) {
            rule.custom_message = join_custom_message(&rule.custom_message, &armed);
        }
    }

    if !state.cache.replace(rule_id, rule) {
        tracing::error!(trace_id = %trace_id, rule_id, "Notification update failed, old rule kept");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &trace_id,
            "storage_error",
            "failed to store updated notification",
        );
    }
    success_empty_response(StatusCode::OK, &trace_id, "notification updated")
}

pub async fn delete_notification(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(rule_id): Path<u64>,
) -> Response {
    if state.cache.remove(rule_id) {
        tracing::info!(trace_id = %trace_id, rule_id, "Notification deleted");
        success_empty_response(StatusCode::OK, &trace_id, "notification deleted")
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "notification not found",
        )
    }
}

/// Sends the fixed test message synchronously and reports whether any
/// channel accepted it.
pub async fn send_test(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<TestRequest>,
) -> Response {
    let dispatcher = &state.dispatcher;
    let delivered = dispatcher
        .dispatch(DispatchRequest {
            allowed_channels: req.channels,
            subject: dispatcher.test_subject(),
            body: dispatcher.test_body(),
            ..Default::default()
        })
        .await;
    tracing::info!(trace_id = %trace_id, delivered, "Test notification sent");
    success_response(StatusCode::OK, &trace_id, TestResult { delivered })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_for_threshold_kinds() {
        assert_eq!(
            build_params(NotificationKind::Temperature, 0, &json!(30), true).unwrap(),
            "T;>;30;1"
        );
        assert_eq!(
            build_params(NotificationKind::Humidity, 5, &json!("40"), false).unwrap(),
            "H;<;40;0"
        );
        assert!(build_params(NotificationKind::Temperature, 6, &json!(1), false).is_err());
    }

    #[test]
    fn params_for_fixed_kinds() {
        assert_eq!(
            build_params(NotificationKind::SwitchOn, 0, &json!(0), true).unwrap(),
            "S"
        );
        assert_eq!(
            build_params(NotificationKind::SwitchOn, 2, &json!(30), false).unwrap(),
            "S;=;30"
        );
        assert_eq!(
            build_params(NotificationKind::SwitchOff, 2, &json!(30), false).unwrap(),
            "O"
        );
        assert_eq!(
            build_params(NotificationKind::DewPoint, 1, &Value::Null, true).unwrap(),
            "D"
        );
    }
}
