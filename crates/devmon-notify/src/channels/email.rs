use crate::plugin::{config_keys, ChannelPlugin};
use crate::{NotificationChannel, OutgoingMessage};
use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub struct EmailChannel {
    name: String,
    enabled: bool,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    recipients: Vec<String>,
    config_keys: Vec<String>,
}

impl EmailChannel {
    pub fn new(
        name: &str,
        enabled: bool,
        smtp_host: &str,
        smtp_port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
        recipients: Vec<String>,
    ) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?.port(smtp_port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            enabled,
            transport: builder.build(),
            from: from.to_string(),
            recipients,
            config_keys: Vec::new(),
        })
    }

    fn format_body(message: &OutgoingMessage) -> String {
        let body = if message.body.is_empty() {
            &message.subject
        } else {
            &message.body
        };
        format!(
            "Device: {device}\nMessage: {body}\nPriority: {priority}",
            device = message.device_name,
            body = body,
            priority = message.priority,
        )
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        !self.from.is_empty() && !self.recipients.is_empty()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_in_config(&self, key: &str) -> bool {
        self.config_keys.iter().any(|k| k == key)
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let subject = format!("[devmon] {}", message.subject);
        let body = Self::format_body(message);
        let mut failed = 0usize;

        for recipient in &self.recipients {
            let email = Message::builder()
                .from(self.from.parse()?)
                .to(recipient.parse()?)
                .subject(&subject)
                .header(ContentType::TEXT_PLAIN)
                .body(body.clone())?;

            let mut last_err = None;
            for attempt in 0..3u32 {
                match self.transport.send(email.clone()).await {
                    Ok(_) => {
                        last_err = None;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            attempt = attempt + 1,
                            recipient = %recipient,
                            error = %e,
                            "Email send failed, retrying"
                        );
                        last_err = Some(e);
                        if attempt < 2 {
                            tokio::time::sleep(std::time::Duration::from_millis(
                                100 * 2u64.pow(attempt),
                            ))
                            .await;
                        }
                    }
                }
            }

            if let Some(e) = last_err {
                tracing::error!(recipient = %recipient, error = %e, "Email send failed after 3 retries");
                failed += 1;
            }
        }

        if failed == self.recipients.len() && failed > 0 {
            anyhow::bail!("email delivery failed for all {failed} recipients");
        }
        Ok(())
    }
}

// Plugin

#[derive(Deserialize)]
struct EmailConfig {
    smtp_host: String,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    from: String,
    #[serde(default)]
    recipients: Vec<String>,
}

fn default_smtp_port() -> u16 {
    587
}

pub struct EmailPlugin;

impl ChannelPlugin for EmailPlugin {
    fn name(&self) -> &str {
        "email"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        serde_json::from_value::<EmailConfig>(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid email config: {e}"))?;
        Ok(())
    }

    fn create_channel(
        &self,
        channel_name: &str,
        enabled: bool,
        config: &Value,
    ) -> Result<Arc<dyn NotificationChannel>> {
        let cfg: EmailConfig = serde_json::from_value(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid email config: {e}"))?;
        let mut channel = EmailChannel::new(
            channel_name,
            enabled,
            &cfg.smtp_host,
            cfg.smtp_port,
            cfg.smtp_username.as_deref(),
            cfg.smtp_password.as_deref(),
            &cfg.from,
            cfg.recipients,
        )?;
        channel.config_keys = config_keys(config);
        Ok(Arc::new(channel))
    }

    fn redact_config(&self, config: &Value) -> Value {
        let mut redacted = config.clone();
        if let Some(obj) = redacted.as_object_mut() {
            if obj.contains_key("smtp_password") {
                obj.insert(
                    "smtp_password".to_string(),
                    Value::String("***".to_string()),
                );
            }
        }
        redacted
    }
}
