use crate::NotificationChannel;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Name-keyed set of live channel instances, populated at startup.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<BTreeMap<String, Arc<dyn NotificationChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn NotificationChannel>>> {
        self.channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn NotificationChannel>>> {
        self.channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a channel, replacing any previous channel of the same name.
    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        if self.write().insert(name.clone(), channel).is_some() {
            tracing::warn!(channel = %name, "Replaced existing notification channel");
        }
    }

    pub fn remove_channel(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NotificationChannel>> {
        self.read().get(name).cloned()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Snapshot of every registered channel, in name order.
    pub fn channels(&self) -> Vec<Arc<dyn NotificationChannel>> {
        self.read().values().cloned().collect()
    }

    /// True if any registered channel defines the config key.
    pub fn is_in_config(&self, key: &str) -> bool {
        self.read().values().any(|c| c.is_in_config(key))
    }

    pub fn log_summary(&self) {
        let channels = self.read();
        let active: Vec<&str> = channels
            .values()
            .filter(|c| c.is_configured() && c.is_enabled())
            .map(|c| c.name())
            .collect();
        if active.is_empty() {
            tracing::info!("No active notification channels");
        } else {
            tracing::info!(
                "Active notification channels: {} ({}/{})",
                active.join(", "),
                active.len(),
                channels.len()
            );
        }
    }
}
