use std::path::PathBuf;

/// Errors that can occur within the notification subsystem.
///
/// Channel and plugin traits return `anyhow::Result`; this type covers
/// configuration parsing and custom-action handling.
///
/// # Examples
///
/// ```rust
/// use devmon_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp_host".to_string());
/// assert!(err.to_string().contains("smtp_host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not registered in the plugin registry.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// JSON deserialization of a channel config failed.
    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A script action tried to leave the scripts directory.
    #[error("Notify: unsafe custom action rejected: {0}")]
    UnsafeAction(String),

    /// A script action points at a file that does not exist.
    #[error("Notify: script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    /// The custom action scheme is neither http(s) nor script.
    #[error("Notify: unsupported custom action: {0}")]
    UnsupportedAction(String),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
