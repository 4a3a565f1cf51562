use crate::plugin::{config_keys, ChannelPlugin};
use crate::utils::{render_template, truncate_string, MAX_BODY_LENGTH};
use crate::{NotificationChannel, OutgoingMessage};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub struct WebhookChannel {
    name: String,
    enabled: bool,
    url: String,
    body_template: Option<String>,
    config_keys: Vec<String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(name: &str, enabled: bool, url: &str, body_template: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            enabled,
            url: url.to_string(),
            body_template,
            config_keys: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    fn render_body(&self, message: &OutgoingMessage) -> String {
        match &self.body_template {
            Some(template) => render_template(template, message),
            None => serde_json::json!({
                "device_id": message.device_id,
                "device_name": message.device_name,
                "subject": message.subject,
                "body": message.body,
                "extra_data": message.extra_data,
                "priority": message.priority,
                "sound": message.sound,
            })
            .to_string(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_in_config(&self, key: &str) -> bool {
        self.config_keys.iter().any(|k| k == key)
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let body = self.render_body(message);
        let mut last_err = None;

        for attempt in 0..3u32 {
            match self
                .client
                .post(self.url.as_str())
                .header("Content-Type", "application/json")
                .body(body.clone())
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let resp_body = match resp.text().await {
                        Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
                        Err(e) => format!("[Failed to read response body: {e}]"),
                    };
                    tracing::warn!(
                        attempt = attempt + 1,
                        status = %status,
                        "Webhook returned non-success status, retrying"
                    );
                    last_err = Some(anyhow::anyhow!("HTTP {status}: {resp_body}"));
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Webhook send failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("webhook delivery failed")))
    }
}

// Plugin

#[derive(Deserialize)]
struct WebhookConfig {
    url: String,
    body_template: Option<String>,
}

pub struct WebhookPlugin;

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        serde_json::from_value::<WebhookConfig>(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid webhook config: {e}"))?;
        Ok(())
    }

    fn create_channel(
        &self,
        channel_name: &str,
        enabled: bool,
        config: &Value,
    ) -> Result<Arc<dyn NotificationChannel>> {
        let cfg: WebhookConfig = serde_json::from_value(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid webhook config: {e}"))?;
        let mut channel = WebhookChannel::new(channel_name, enabled, &cfg.url, cfg.body_template);
        channel.config_keys = config_keys(config);
        Ok(Arc::new(channel))
    }
}
