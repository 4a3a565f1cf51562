//! Notification delivery with pluggable channel support.
//!
//! Rendered alert messages are fanned out by the [`dispatcher::Dispatcher`]
//! to every [`NotificationChannel`] held in the
//! [`registry::ChannelRegistry`]. Built-in channels are HTTP webhook and
//! email (SMTP); custom actions attached to a rule are handed to a
//! [`tasks::TaskQueue`].

pub mod action;
pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod tasks;
pub mod utils;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A fully rendered message ready to be delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub device_id: u64,
    pub device_name: String,
    pub subject: String,
    pub body: String,
    /// `|Key=value|` tags (switch type, image, status) for channels that render icons.
    pub extra_data: String,
    pub priority: i32,
    pub sound: String,
    /// Set for messages raised by device events, unset for manual sends.
    pub from_event: bool,
}

/// A notification delivery channel that sends messages to an external
/// service (e.g., SMTP, webhook).
///
/// Implementations are created by the corresponding [`plugin::ChannelPlugin`]
/// and held in the [`registry::ChannelRegistry`].
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Registry key of this channel instance (e.g., `"email"`).
    fn name(&self) -> &str;

    /// True once every setting required for delivery is present.
    fn is_configured(&self) -> bool;

    /// Operator switch; disabled channels only receive test messages.
    fn is_enabled(&self) -> bool;

    /// Whether this channel's configuration defines `key`.
    fn is_in_config(&self, _key: &str) -> bool {
        false
    }

    /// Delivers the message through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after retries (if applicable).
    async fn send(&self, message: &OutgoingMessage) -> Result<()>;
}
