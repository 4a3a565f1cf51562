use crate::action::run_custom_action;
use crate::registry::ChannelRegistry;
use crate::tasks::TaskQueue;
use crate::{NotificationChannel, OutgoingMessage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct DispatcherConfig {
    /// Product name used to recognise test messages.
    pub product_name: String,
    pub scripts_dir: PathBuf,
    /// Upper bound on channel sends running at the same time.
    pub max_concurrent_sends: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            product_name: "devmon".to_string(),
            scripts_dir: PathBuf::from("scripts"),
            max_concurrent_sends: 16,
        }
    }
}

/// Everything needed to deliver one rendered message.
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    pub device_id: u64,
    pub device_name: String,
    /// Empty means every configured channel.
    pub allowed_channels: Vec<String>,
    pub custom_action: String,
    pub subject: String,
    pub body: String,
    pub extra_data: String,
    pub priority: i32,
    pub sound: String,
    pub from_event: bool,
}

/// Fans messages out to channels and triggers custom actions.
pub struct Dispatcher {
    channels: Arc<ChannelRegistry>,
    tasks: Arc<dyn TaskQueue>,
    config: DispatcherConfig,
    send_permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(channels: Arc<ChannelRegistry>, tasks: Arc<dyn TaskQueue>, config: DispatcherConfig) -> Self {
        let send_permits = Arc::new(Semaphore::new(config.max_concurrent_sends.max(1)));
        Self {
            channels,
            tasks,
            config,
            send_permits,
        }
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn test_subject(&self) -> String {
        format!("{} test", self.config.product_name)
    }

    pub fn test_body(&self) -> String {
        format!("{} test message!", self.config.product_name)
    }

    pub fn is_test_message(&self, subject: &str, body: &str) -> bool {
        subject == self.test_subject() && body == self.test_body()
    }

    /// Delivers a message.
    ///
    /// Test messages are sent in order on the calling task, reach disabled
    /// channels too, and return whether any channel succeeded. Everything
    /// else is handed to one spawned task per enabled channel and reports
    /// `true` immediately.
    pub async fn dispatch(&self, request: DispatchRequest) -> bool {
        let is_test = self.is_test_message(&request.subject, &request.body);

        if !request.custom_action.is_empty() {
            self.run_action(&request);
        }

        let targets: Vec<Arc<dyn NotificationChannel>> = self
            .channels
            .channels()
            .into_iter()
            .filter(|c| {
                request.allowed_channels.is_empty()
                    || request.allowed_channels.iter().any(|n| n == c.name())
            })
            .filter(|c| c.is_configured())
            .filter(|c| is_test || c.is_enabled())
            .collect();

        let message = OutgoingMessage {
            device_id: request.device_id,
            device_name: request.device_name,
            subject: request.subject,
            body: request.body,
            extra_data: request.extra_data,
            priority: if is_test { 0 } else { request.priority },
            sound: request.sound,
            from_event: request.from_event,
        };

        if is_test {
            let mut delivered = false;
            for channel in targets {
                match channel.send(&message).await {
                    Ok(()) => delivered = true,
                    Err(e) => {
                        tracing::error!(channel = channel.name(), error = %e, "Test notification failed");
                    }
                }
            }
            return delivered;
        }

        let message = Arc::new(message);
        for channel in targets {
            let message = message.clone();
            let permits = self.send_permits.clone();
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if let Err(e) = channel.send(&message).await {
                    tracing::error!(
                        channel = channel.name(),
                        device_id = message.device_id,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            });
        }
        true
    }

    fn run_action(&self, request: &DispatchRequest) {
        match run_custom_action(
            &request.custom_action,
            &request.subject,
            &self.config.scripts_dir,
            self.tasks.as_ref(),
        ) {
            Ok(action) => {
                tracing::debug!(device_id = request.device_id, action = ?action, "Custom action queued");
            }
            Err(e) => {
                tracing::error!(device_id = request.device_id, error = %e, "Custom action dropped");
            }
        }
    }
}
