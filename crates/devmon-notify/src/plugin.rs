use crate::NotificationChannel;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory for creating [`NotificationChannel`] instances from JSON
/// configuration.
///
/// Each plugin is registered in the [`PluginRegistry`] by its `name()`.
/// At startup the server validates every configured channel and
/// instantiates it through the matching plugin.
pub trait ChannelPlugin: Send + Sync {
    /// Returns the plugin type name (e.g., `"email"`, `"webhook"`).
    fn name(&self) -> &str;

    /// Validates a JSON config blob against this plugin's expected schema.
    fn validate_config(&self, config: &Value) -> Result<()>;

    /// Creates a configured channel instance registered under `channel_name`.
    fn create_channel(
        &self,
        channel_name: &str,
        enabled: bool,
        config: &Value,
    ) -> Result<Arc<dyn NotificationChannel>>;

    /// Returns a copy of `config` with secrets redacted. Used for logging.
    fn redact_config(&self, config: &Value) -> Value {
        config.clone()
    }
}

/// Registry of available [`ChannelPlugin`]s.
///
/// # Examples
///
/// ```
/// use devmon_notify::plugin::PluginRegistry;
///
/// let registry = PluginRegistry::default();
/// assert!(registry.has_plugin("email"));
/// assert!(registry.has_plugin("webhook"));
/// assert!(!registry.has_plugin("nonexistent"));
/// ```
pub struct PluginRegistry {
    plugins: HashMap<String, Box<dyn ChannelPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn ChannelPlugin>) {
        let name = plugin.name().to_string();
        self.plugins.insert(name, plugin);
    }

    pub fn create_channel(
        &self,
        type_name: &str,
        channel_name: &str,
        enabled: bool,
        config: &Value,
    ) -> Result<Arc<dyn NotificationChannel>> {
        let plugin = self
            .plugins
            .get(type_name)
            .ok_or_else(|| crate::error::NotifyError::UnknownChannelType(type_name.to_string()))?;
        plugin.validate_config(config)?;
        plugin.create_channel(channel_name, enabled, config)
    }

    pub fn get_plugin(&self, type_name: &str) -> Option<&dyn ChannelPlugin> {
        self.plugins.get(type_name).map(|p| p.as_ref())
    }

    pub fn has_plugin(&self, type_name: &str) -> bool {
        self.plugins.contains_key(type_name)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::channels::email::EmailPlugin));
        registry.register(Box::new(crate::channels::webhook::WebhookPlugin));
        registry
    }
}

/// Top-level keys of a JSON object config.
pub(crate) fn config_keys(config: &Value) -> Vec<String> {
    config
        .as_object()
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}
