/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use devmon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "device",
///     id: "42".to_string(),
/// };
/// assert!(err.to_string().contains("device"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A timestamp column could not be parsed.
    #[error("Storage: invalid timestamp in column '{column}': {value}")]
    InvalidTimestamp { column: &'static str, value: String },

    /// A column held a value outside its expected domain.
    #[error("Storage: unexpected value in column '{column}': {value}")]
    UnexpectedValue { column: &'static str, value: String },

    /// Filesystem error while preparing the database location.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
