use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Used in test message subjects (`"<product> test"`).
    #[serde(default = "default_product_name")]
    pub product_name: String,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Minimum seconds between two sends of one sensor rule.
    #[serde(default = "default_sensor_interval_secs")]
    pub sensor_interval_secs: u64,
    #[serde(default)]
    pub switch_interval_secs: u64,
    /// `"C"` or `"F"`, the unit temperature thresholds are entered in.
    #[serde(default = "default_temp_unit")]
    pub temp_unit: String,
    #[serde(default = "default_watchdog_tick_secs")]
    pub watchdog_tick_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sensor_interval_secs: default_sensor_interval_secs(),
            switch_interval_secs: 0,
            temp_unit: default_temp_unit(),
            watchdog_tick_secs: default_watchdog_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Base directory for relative `script://` actions.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            max_concurrent_sends: default_max_concurrent_sends(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token required by mutating endpoints. Unset disables them.
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// One notification channel instance, built by the plugin named in `channel_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub channel_type: String,
    #[serde(default = "default_channel_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_json::Value,
}

// ---- Seed file types (used by `init-rules` CLI subcommand) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesSeedFile {
    #[serde(default)]
    pub devices: Vec<devmon_common::types::DeviceInfo>,
    #[serde(default)]
    pub rules: Vec<devmon_common::types::NewRule>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_database_path() -> String {
    "data/devmon.db".to_string()
}

fn default_product_name() -> String {
    "devmon".to_string()
}

fn default_sensor_interval_secs() -> u64 {
    12 * 3600
}

fn default_temp_unit() -> String {
    "C".to_string()
}

fn default_watchdog_tick_secs() -> u64 {
    60
}

fn default_scripts_dir() -> String {
    "scripts".to_string()
}

fn default_max_concurrent_sends() -> usize {
    16
}

fn default_channel_enabled() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            database_path: default_database_path(),
            product_name: default_product_name(),
            alert: AlertConfig::default(),
            notify: NotifyConfig::default(),
            auth: AuthConfig::default(),
            channels: Vec::new(),
        }
    }
}
