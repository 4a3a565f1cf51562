use crate::config::{ChannelConfig, ServerConfig};
use anyhow::Result;
use chrono::{DateTime, Utc};
use devmon_alert::cache::RuleCache;
use devmon_alert::engine::{EngineSettings, NotificationEngine, TempUnit};
use devmon_notify::dispatcher::{Dispatcher, DispatcherConfig};
use devmon_notify::plugin::PluginRegistry;
use devmon_notify::registry::ChannelRegistry;
use devmon_notify::tasks::TokioTaskQueue;
use devmon_storage::store::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub cache: Arc<RuleCache>,
    pub engine: Arc<NotificationEngine>,
    pub dispatcher: Arc<Dispatcher>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Opens the database at `config.database_path` and wires every component.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(Path::new(&config.database_path))?);
        let channels = build_channel_registry(&config.channels);
        Self::with_parts(config, store, channels)
    }

    /// Wires components around an already opened store and channel set.
    pub fn with_parts(
        config: ServerConfig,
        store: Arc<SqliteStore>,
        channels: Arc<ChannelRegistry>,
    ) -> Result<Self> {
        let cache = Arc::new(RuleCache::new(store.clone(), store.clone()));
        cache.reload();

        let dispatcher = Arc::new(Dispatcher::new(
            channels,
            Arc::new(TokioTaskQueue::new()),
            DispatcherConfig {
                product_name: config.product_name.clone(),
                scripts_dir: PathBuf::from(&config.notify.scripts_dir),
                max_concurrent_sends: config.notify.max_concurrent_sends,
            },
        ));

        let engine = Arc::new(NotificationEngine::new(
            cache.clone(),
            store.clone(),
            dispatcher.clone(),
            engine_settings(&config)?,
        ));

        Ok(Self {
            store,
            cache,
            engine,
            dispatcher,
            start_time: Utc::now(),
            config: Arc::new(config),
        })
    }
}

pub fn engine_settings(config: &ServerConfig) -> Result<EngineSettings> {
    let temp_unit: TempUnit = config
        .alert
        .temp_unit
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    Ok(EngineSettings {
        sensor_interval: chrono::Duration::seconds(config.alert.sensor_interval_secs as i64),
        switch_interval: chrono::Duration::seconds(config.alert.switch_interval_secs as i64),
        temp_unit,
    })
}

/// Instantiates configured channels through their plugins.
///
/// A channel whose type is unknown or whose config fails validation is
/// skipped with an error log; the rest still load.
pub fn build_channel_registry(configs: &[ChannelConfig]) -> Arc<ChannelRegistry> {
    let plugins = PluginRegistry::default();
    let registry = Arc::new(ChannelRegistry::new());
    for ch in configs {
        match plugins.create_channel(&ch.channel_type, &ch.name, ch.enabled, &ch.config) {
            Ok(channel) => {
                let redacted = plugins
                    .get_plugin(&ch.channel_type)
                    .map(|p| p.redact_config(&ch.config))
                    .unwrap_or_default();
                tracing::info!(
                    channel = %ch.name,
                    channel_type = %ch.channel_type,
                    enabled = ch.enabled,
                    config = %redacted,
                    "Loaded notification channel"
                );
                registry.add_channel(channel);
            }
            Err(e) => {
                tracing::error!(
                    channel = %ch.name,
                    channel_type = %ch.channel_type,
                    error = %e,
                    "Skipping invalid notification channel"
                );
            }
        }
    }
    registry.log_summary();
    registry
}
