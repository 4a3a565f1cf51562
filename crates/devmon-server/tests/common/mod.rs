#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use devmon_notify::registry::ChannelRegistry;
use devmon_notify::{NotificationChannel, OutgoingMessage};
use devmon_server::app;
use devmon_server::config::{AuthConfig, ServerConfig};
use devmon_server::state::AppState;
use devmon_storage::store::SqliteStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::util::ServiceExt;

pub const ADMIN_TOKEN: &str = "admin-secret";

/// Channel that hands every delivered message to the test.
pub struct RecordingChannel {
    name: String,
    tx: mpsc::UnboundedSender<OutgoingMessage>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let _ = self.tx.send(message.clone());
        Ok(())
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
    pub sent: mpsc::UnboundedReceiver<OutgoingMessage>,
}

impl TestContext {
    /// Next delivered message, failing the test after two seconds.
    pub async fn next_message(&mut self) -> OutgoingMessage {
        tokio::time::timeout(Duration::from_secs(2), self.sent.recv())
            .await
            .expect("a message should be delivered")
            .expect("channel should stay open")
    }

    pub async fn assert_no_message(&mut self) {
        let res = tokio::time::timeout(Duration::from_millis(200), self.sent.recv()).await;
        assert!(res.is_err(), "unexpected message: {res:?}");
    }
}

pub fn build_test_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("devmon.db");
    let store = Arc::new(SqliteStore::open(&db_path)?);

    let (tx, sent) = mpsc::unbounded_channel();
    let channels = Arc::new(ChannelRegistry::new());
    channels.add_channel(Arc::new(RecordingChannel {
        name: "recorder".to_string(),
        tx,
    }));

    let config = ServerConfig {
        database_path: db_path.to_string_lossy().to_string(),
        auth: AuthConfig {
            admin_token: Some(ADMIN_TOKEN.to_string()),
        },
        ..Default::default()
    };

    let state = AppState::with_parts(config, store, channels)?;
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
        sent,
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder = builder.header("Content-Type", "application/json");

    let req_body = body.unwrap_or(Value::Null).to_string();
    let req = builder
        .body(Body::from(req_body))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    read_response(resp).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let req = builder.body(Body::empty()).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    read_response(resp).await
}

async fn read_response(resp: axum::response::Response) -> (StatusCode, Value, Option<String>) {
    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub fn assert_ok_envelope(body: &Value) {
    assert_eq!(body["err_code"], 0, "body: {body}");
    assert!(body["err_msg"].is_string());
    assert!(body["trace_id"].as_str().is_some());
}

pub fn assert_err_envelope(body: &Value, code: i64) {
    assert_eq!(body["err_code"], code, "body: {body}");
    assert!(body["err_msg"].is_string());
    assert!(body["trace_id"].as_str().is_some());
    assert!(body["data"].is_null());
}
