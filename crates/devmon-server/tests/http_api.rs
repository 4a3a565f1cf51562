mod common;

use axum::http::StatusCode;
use common::{
    assert_err_envelope, assert_ok_envelope, build_test_context, request_json, request_no_body,
    TestContext, ADMIN_TOKEN,
};
use serde_json::{json, Value};

const ATTIC_ALERT: &str = "Attic Temperature is 32.0 degrees [> 30.0 degrees]";

async fn add_device(ctx: &TestContext, body: Value) {
    let (status, resp, _) =
        request_json(&ctx.app, "POST", "/v1/devices", Some(ADMIN_TOKEN), Some(body)).await;
    assert_eq!(status, StatusCode::OK, "body: {resp}");
    assert_ok_envelope(&resp);
}

async fn add_rule(ctx: &TestContext, device_id: u64, body: Value) -> (StatusCode, Value) {
    let (status, resp, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/v1/devices/{device_id}/notifications"),
        Some(ADMIN_TOKEN),
        Some(body),
    )
    .await;
    (status, resp)
}

async fn list_rules(ctx: &TestContext, device_id: u64) -> Value {
    let (status, resp, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/devices/{device_id}/notifications"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&resp);
    resp["data"].clone()
}

async fn report_temp(ctx: &TestContext, device_id: u64, temp: f64) -> Value {
    let (status, resp, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/reports",
        None,
        Some(json!({
            "row_id": device_id,
            "name": "Attic",
            "device": {"type": "temp"},
            "f_value": temp,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {resp}");
    assert_ok_envelope(&resp);
    resp
}

async fn attic_with_rule(ctx: &TestContext) {
    add_device(ctx, json!({"id": 12, "name": "Attic"})).await;
    let (status, resp) = add_rule(
        ctx,
        12,
        json!({"kind": "T", "when": 0, "value": 30, "recovery": true}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "body: {resp}");
}

#[tokio::test]
async fn health_should_return_ok_envelope() {
    let ctx = build_test_context().expect("test context should build");
    let (status, body, trace) = request_no_body(&ctx.app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert!(body["data"]["version"].is_string());
    assert_eq!(body["data"]["channel_count"], 1);
    assert_eq!(body["trace_id"].as_str(), trace.as_deref());
}

#[tokio::test]
async fn admin_endpoints_require_admin_token() {
    let ctx = build_test_context().expect("test context should build");
    let rule = json!({"kind": "T", "when": 0, "value": 30});

    for token in [None, Some("wrong-token")] {
        let (status, body, _) = request_json(
            &ctx.app,
            "POST",
            "/v1/devices/12/notifications",
            token,
            Some(rule.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_err_envelope(&body, 1003);
    }

    let (status, body, _) =
        request_no_body(&ctx.app, "DELETE", "/v1/notifications/1", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_err_envelope(&body, 1003);

    let (status, _, _) =
        request_json(&ctx.app, "POST", "/v1/notifications/test", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/devices",
        None,
        Some(json!({"id": 1, "name": "Hall"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Listing stays open.
    let data = list_rules(&ctx, 12).await;
    assert_eq!(data["rules"], json!([]));
}

#[tokio::test]
async fn add_rejects_duplicates_and_lists_rules() {
    let ctx = build_test_context().expect("test context should build");
    let body = json!({"kind": "T", "when": 0, "value": 30, "recovery": true});

    let (status, resp) = add_rule(&ctx, 12, body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ok_envelope(&resp);
    assert_eq!(resp["data"]["params"], "T;>;30;1");

    let (status, resp) = add_rule(&ctx, 12, body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&resp, 1005);

    let (status, _) = add_rule(&ctx, 12, json!({"kind": "S", "when": 2, "value": 20})).await;
    assert_eq!(status, StatusCode::CREATED);

    let data = list_rules(&ctx, 12).await;
    assert_eq!(data["channels"], json!(["recorder"]));
    let params: Vec<&str> = data["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["params"].as_str().unwrap())
        .collect();
    assert_eq!(params.len(), 2);
    assert!(params.contains(&"T;>;30;1"));
    assert!(params.contains(&"S;=;20"));
}

#[tokio::test]
async fn add_validates_kind_condition_and_channels() {
    let ctx = build_test_context().expect("test context should build");

    let (status, resp) = add_rule(&ctx, 12, json!({"kind": "Z", "when": 0, "value": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&resp, 1101);

    let (status, resp) = add_rule(&ctx, 12, json!({"kind": "H", "when": 9, "value": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&resp, 1102);

    let (status, resp) = add_rule(
        &ctx,
        12,
        json!({"kind": "H", "when": 0, "value": 80, "active_channels": ["pager"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&resp, 1103);

    assert_eq!(list_rules(&ctx, 12).await["rules"], json!([]));
}

#[tokio::test]
async fn report_raises_alert_then_recovery() {
    let mut ctx = build_test_context().expect("test context should build");
    attic_with_rule(&ctx).await;

    let resp = report_temp(&ctx, 12, 32.0).await;
    assert_eq!(resp["data"]["dispatched"], 1);
    let alert = ctx.next_message().await;
    assert_eq!(alert.subject, ATTIC_ALERT);
    assert!(alert.from_event);

    let resp = report_temp(&ctx, 12, 28.0).await;
    assert_eq!(resp["data"]["dispatched"], 1);
    let recovery = ctx.next_message().await;
    assert_eq!(recovery.body, format!("[Recovered] {ATTIC_ALERT}"));

    let resp = report_temp(&ctx, 12, 27.0).await;
    assert_eq!(resp["data"]["dispatched"], 0);
    ctx.assert_no_message().await;
}

#[tokio::test]
async fn report_without_row_id_is_rejected() {
    let ctx = build_test_context().expect("test context should build");
    let (status, resp, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/reports",
        None,
        Some(json!({"name": "Orphan", "device": {"type": "temp"}, "f_value": 40.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&resp, 1001);
}

#[tokio::test]
async fn update_keeps_armed_recovery() {
    let mut ctx = build_test_context().expect("test context should build");
    attic_with_rule(&ctx).await;

    report_temp(&ctx, 12, 32.0).await;
    ctx.next_message().await;

    let data = list_rules(&ctx, 12).await;
    let rule_id = data["rules"][0]["id"].as_u64().unwrap();

    let (status, resp, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/notifications/{rule_id}"),
        Some(ADMIN_TOKEN),
        Some(json!({
            "kind": "T",
            "when": 0,
            "value": 31,
            "recovery": true,
            "custom_message": "Too hot in $name",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {resp}");
    assert_ok_envelope(&resp);

    let data = list_rules(&ctx, 12).await;
    let rules = data["rules"].as_array().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["params"], "T;>;31;1");
    assert_eq!(
        rules[0]["custom_message"],
        format!("Too hot in $name;;[Recovered] {ATTIC_ALERT}")
    );

    report_temp(&ctx, 12, 25.0).await;
    let recovery = ctx.next_message().await;
    assert_eq!(recovery.body, format!("[Recovered] {ATTIC_ALERT}"));
}

#[tokio::test]
async fn update_without_recovery_drops_armed_text() {
    let mut ctx = build_test_context().expect("test context should build");
    attic_with_rule(&ctx).await;
    report_temp(&ctx, 12, 32.0).await;
    ctx.next_message().await;

    let rule_id = list_rules(&ctx, 12).await["rules"][0]["id"].as_u64().unwrap();
    let (status, _, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/notifications/{rule_id}"),
        Some(ADMIN_TOKEN),
        Some(json!({"kind": "T", "when": 0, "value": 30, "custom_message": "hot"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let data = list_rules(&ctx, 12).await;
    assert_eq!(data["rules"][0]["params"], "T;>;30;0");
    assert_eq!(data["rules"][0]["custom_message"], "hot");
}

#[tokio::test]
async fn update_and_delete_unknown_rule_return_not_found() {
    let ctx = build_test_context().expect("test context should build");
    let (status, resp, _) = request_json(
        &ctx.app,
        "PUT",
        "/v1/notifications/999",
        Some(ADMIN_TOKEN),
        Some(json!({"kind": "T", "when": 0, "value": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&resp, 1004);

    attic_with_rule(&ctx).await;
    let rule_id = list_rules(&ctx, 12).await["rules"][0]["id"].as_u64().unwrap();
    let uri = format!("/v1/notifications/{rule_id}");

    let (status, resp, _) = request_no_body(&ctx.app, "DELETE", &uri, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&resp);

    let (status, resp, _) = request_no_body(&ctx.app, "DELETE", &uri, Some(ADMIN_TOKEN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&resp, 1004);
}

#[tokio::test]
async fn test_message_is_delivered_synchronously() {
    let mut ctx = build_test_context().expect("test context should build");
    let (status, resp, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/notifications/test",
        Some(ADMIN_TOKEN),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["delivered"], true);

    let message = ctx.next_message().await;
    assert_eq!(message.subject, "devmon test");
    assert_eq!(message.body, "devmon test message!");
    assert!(!message.from_event);

    let (_, resp, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/notifications/test",
        Some(ADMIN_TOKEN),
        Some(json!({"channels": ["pager"]})),
    )
    .await;
    assert_eq!(resp["data"]["delivered"], false);
}

#[tokio::test]
async fn switch_event_uses_device_switch_text() {
    let mut ctx = build_test_context().expect("test context should build");
    add_device(
        &ctx,
        json!({"id": 20, "name": "Front Door", "switch_type": "door_contact"}),
    )
    .await;
    let (status, resp) = add_rule(&ctx, 20, json!({"kind": "S"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(resp["data"]["params"], "S");

    let (status, resp, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/devices/20/events",
        None,
        Some(json!({"event": "switch", "on": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["dispatched"], 1);

    let message = ctx.next_message().await;
    assert_eq!(message.subject, "Front Door Open");
    assert_eq!(
        message.extra_data,
        "|Name=Front Door|SwitchType=door_contact|CustomImage=0|Status=On|Image=Door48_On|"
    );

    // No off rule.
    let (_, resp, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/devices/20/events",
        None,
        Some(json!({"event": "switch", "on": false})),
    )
    .await;
    assert_eq!(resp["data"]["dispatched"], 0);
}

#[tokio::test]
async fn event_checks_device_and_kind() {
    let ctx = build_test_context().expect("test context should build");
    let (status, resp, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/devices/77/events",
        None,
        Some(json!({"event": "alert_text", "text": "battery low"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&resp, 1004);

    add_device(&ctx, json!({"id": 77, "name": "Smoke"})).await;
    let (status, resp, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/devices/77/events",
        None,
        Some(json!({"event": "message", "kind": "Z", "message": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&resp, 1101);
}
