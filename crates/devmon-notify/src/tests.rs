use crate::action::{
    parse_custom_action, run_custom_action, split_script_args, CustomAction, ACTION_TASK_DELAY,
};
use crate::dispatcher::{DispatchRequest, Dispatcher, DispatcherConfig};
use crate::error::NotifyError;
use crate::plugin::PluginRegistry;
use crate::registry::ChannelRegistry;
use crate::tasks::TaskQueue;
use crate::{NotificationChannel, OutgoingMessage};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

struct RecordingChannel {
    name: String,
    configured: bool,
    enabled: bool,
    succeed: bool,
    sent: Mutex<Vec<OutgoingMessage>>,
    notify: Option<mpsc::UnboundedSender<String>>,
}

impl RecordingChannel {
    fn new(name: &str, configured: bool, enabled: bool, succeed: bool) -> Self {
        Self {
            name: name.to_string(),
            configured,
            enabled,
            succeed,
            sent: Mutex::new(Vec::new()),
            notify: None,
        }
    }

    fn with_notify(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.notify = Some(tx);
        self
    }

    fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_in_config(&self, key: &str) -> bool {
        key == format!("{}_token", self.name)
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        if let Some(tx) = &self.notify {
            let _ = tx.send(self.name.clone());
        }
        if self.succeed {
            Ok(())
        } else {
            anyhow::bail!("{} is down", self.name)
        }
    }
}

#[derive(Default)]
struct RecordingQueue {
    http: Mutex<Vec<(Duration, String, String)>>,
    scripts: Mutex<Vec<(Duration, PathBuf, String)>>,
}

impl TaskQueue for RecordingQueue {
    fn enqueue_http(&self, delay: Duration, url: &str, label: &str) {
        self.http
            .lock()
            .unwrap()
            .push((delay, url.to_string(), label.to_string()));
    }

    fn enqueue_script(&self, delay: Duration, executable: &Path, args: &str) {
        self.scripts
            .lock()
            .unwrap()
            .push((delay, executable.to_path_buf(), args.to_string()));
    }
}

fn dispatcher_with(
    channels: Vec<Arc<RecordingChannel>>,
    scripts_dir: &Path,
) -> (Dispatcher, Arc<RecordingQueue>) {
    let registry = Arc::new(ChannelRegistry::new());
    for c in channels {
        registry.add_channel(c);
    }
    let queue = Arc::new(RecordingQueue::default());
    let dispatcher = Dispatcher::new(
        registry,
        queue.clone(),
        DispatcherConfig {
            product_name: "devmon".into(),
            scripts_dir: scripts_dir.to_path_buf(),
            max_concurrent_sends: 4,
        },
    );
    (dispatcher, queue)
}

fn request(subject: &str, body: &str) -> DispatchRequest {
    DispatchRequest {
        device_id: 12,
        device_name: "Attic".into(),
        subject: subject.into(),
        body: body.into(),
        priority: 2,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_message_reaches_disabled_channels_synchronously() {
    let a = Arc::new(RecordingChannel::new("a", true, false, false));
    let b = Arc::new(RecordingChannel::new("b", true, false, true));
    let c = Arc::new(RecordingChannel::new("c", false, true, true));
    let (dispatcher, _) = dispatcher_with(vec![a.clone(), b.clone(), c.clone()], Path::new("/tmp"));

    let ok = dispatcher
        .dispatch(request("devmon test", "devmon test message!"))
        .await;

    assert!(ok);
    assert_eq!(a.sent().len(), 1);
    assert_eq!(b.sent().len(), 1);
    assert_eq!(b.sent()[0].priority, 0);
    assert!(c.sent().is_empty());
}

#[tokio::test]
async fn test_message_result_is_or_of_channels() {
    let a = Arc::new(RecordingChannel::new("a", true, true, false));
    let b = Arc::new(RecordingChannel::new("b", true, true, false));
    let (dispatcher, _) = dispatcher_with(vec![a, b], Path::new("/tmp"));

    assert!(
        !dispatcher
            .dispatch(request("devmon test", "devmon test message!"))
            .await
    );
}

#[tokio::test]
async fn regular_dispatch_spawns_per_enabled_channel() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let enabled = Arc::new(RecordingChannel::new("push", true, true, false).with_notify(tx.clone()));
    let disabled = Arc::new(RecordingChannel::new("mail", true, false, true).with_notify(tx));
    let (dispatcher, _) = dispatcher_with(vec![enabled.clone(), disabled.clone()], Path::new("/tmp"));

    assert!(dispatcher.dispatch(request("Attic is hot", "")).await);

    let name = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(name, "push");
    assert_eq!(enabled.sent()[0].priority, 2);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(disabled.sent().is_empty());
}

#[tokio::test]
async fn allowed_channels_restrict_targets() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let a = Arc::new(RecordingChannel::new("a", true, true, true).with_notify(tx.clone()));
    let b = Arc::new(RecordingChannel::new("b", true, true, true).with_notify(tx));
    let (dispatcher, _) = dispatcher_with(vec![a.clone(), b.clone()], Path::new("/tmp"));

    let mut req = request("Attic is hot", "");
    req.allowed_channels = vec!["b".into()];
    dispatcher.dispatch(req).await;

    let name = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(name, "b");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(a.sent().is_empty());
}

#[tokio::test]
async fn http_action_is_queued_with_subject() {
    let (dispatcher, queue) = dispatcher_with(vec![], Path::new("/tmp"));
    let mut req = request("Door open", "");
    req.custom_action = "http://hub.local/alert?m=#MESSAGE".into();

    assert!(dispatcher.dispatch(req).await);

    let http = queue.http.lock().unwrap().clone();
    assert_eq!(
        http,
        vec![(
            ACTION_TASK_DELAY,
            "http://hub.local/alert?m=Door open".to_string(),
            "Notification".to_string()
        )]
    );
}

#[tokio::test]
async fn traversal_script_is_rejected_and_nothing_queued() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, queue) = dispatcher_with(vec![], dir.path());
    let mut req = request("Door open", "");
    req.custom_action = "script://../x".into();

    assert!(dispatcher.dispatch(req).await);
    assert!(queue.scripts.lock().unwrap().is_empty());
    assert!(queue.http.lock().unwrap().is_empty());
}

#[test]
fn script_action_resolves_relative_paths() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("notify.sh");
    std::fs::write(&script, "#!/bin/sh\n").unwrap();
    let queue = RecordingQueue::default();

    let action = run_custom_action("script://notify.sh #MESSAGE now", "hot", dir.path(), &queue).unwrap();

    assert_eq!(
        action,
        CustomAction::Script {
            executable: script.clone(),
            args: "hot now".into()
        }
    );
    assert_eq!(
        queue.scripts.lock().unwrap().clone(),
        vec![(ACTION_TASK_DELAY, script, "hot now".to_string())]
    );
}

#[test]
fn script_args_keep_quoted_words_together() {
    assert_eq!(
        split_script_args(r#"--subject "Front Door Open" 'a b'  plain"#),
        vec!["--subject", "Front Door Open", "a b", "plain"]
    );
    assert_eq!(split_script_args(r#""say \"hi\"" """#), vec![r#"say "hi""#, ""]);
    assert_eq!(split_script_args("it's"), vec!["its"]);
    assert!(split_script_args("   ").is_empty());
}

#[test]
fn missing_script_is_not_queued() {
    let dir = tempfile::tempdir().unwrap();
    let queue = RecordingQueue::default();

    let err = run_custom_action("script://absent.sh", "x", dir.path(), &queue).unwrap_err();
    assert!(matches!(err, NotifyError::ScriptNotFound(_)));
    assert!(queue.scripts.lock().unwrap().is_empty());
}

#[test]
fn absolute_script_path_is_kept() {
    let parsed = parse_custom_action("script:///opt/run.sh a b", "x", Path::new("/scripts")).unwrap();
    assert_eq!(
        parsed,
        CustomAction::Script {
            executable: PathBuf::from("/opt/run.sh"),
            args: "a b".into()
        }
    );
    assert!(matches!(
        parse_custom_action("ftp://host", "x", Path::new("/scripts")),
        Err(NotifyError::UnsupportedAction(_))
    ));
    assert!(matches!(
        parse_custom_action("script://ok/../../etc/passwd", "x", Path::new("/scripts")),
        Err(NotifyError::UnsafeAction(_))
    ));
}

#[test]
fn registry_add_remove_and_config_lookup() {
    let registry = ChannelRegistry::new();
    registry.add_channel(Arc::new(RecordingChannel::new("push", true, true, true)));
    registry.add_channel(Arc::new(RecordingChannel::new("mail", true, true, true)));

    assert_eq!(registry.channel_names(), vec!["mail", "push"]);
    assert!(registry.is_in_config("push_token"));
    assert!(!registry.is_in_config("sms_token"));
    assert!(registry.remove_channel("push"));
    assert!(!registry.remove_channel("push"));
    assert!(registry.get("push").is_none());
    assert!(registry.get("mail").is_some());
}

#[test]
fn plugin_registry_builds_webhook_channel() {
    let plugins = PluginRegistry::default();
    let channel = plugins
        .create_channel(
            "webhook",
            "hook",
            true,
            &serde_json::json!({"url": "http://example.invalid/hook"}),
        )
        .unwrap();
    assert_eq!(channel.name(), "hook");
    assert!(channel.is_configured());
    assert!(channel.is_in_config("url"));
    assert!(!channel.is_in_config("body_template"));

    assert!(plugins
        .create_channel("webhook", "hook", true, &serde_json::json!({}))
        .is_err());
    assert!(plugins
        .create_channel("pager", "p", true, &serde_json::json!({}))
        .is_err());
}

#[test]
fn email_plugin_redacts_password() {
    let plugins = PluginRegistry::default();
    let plugin = plugins.get_plugin("email").unwrap();
    let redacted = plugin.redact_config(&serde_json::json!({
        "smtp_host": "smtp.example.com",
        "smtp_password": "hunter2",
        "from": "devmon@example.com"
    }));
    assert_eq!(redacted["smtp_password"], "***");
    assert_eq!(redacted["smtp_host"], "smtp.example.com");
}
