//! Persistence for notification rules and the read-only device registry
//! they are evaluated against.
//!
//! The default implementation ([`store::SqliteStore`]) keeps everything in a
//! single SQLite database. Callers depend on the [`RuleBackend`] and
//! [`DeviceRegistry`] traits so tests and other hosts can substitute their own.

pub mod error;
pub mod store;


use chrono::{DateTime, NaiveDate, Utc};
use devmon_common::types::{DeviceInfo, NewRule, NotificationRule};
use error::Result;

/// Backing store for notification rules.
///
/// All variable content is bound as statement parameters.
pub trait RuleBackend: Send + Sync {
    /// Returns every rule, ordered by device id.
    fn load_rules(&self) -> Result<Vec<NotificationRule>>;

    /// Looks up the id of the rule with exactly these `(device_id, params)`.
    fn find_rule(&self, device_id: u64, params: &str) -> Result<Option<u64>>;

    /// Persists a new rule and returns its id. `last_send` starts as never.
    fn insert_rule(&self, rule: &NewRule) -> Result<u64>;

    /// Swaps a rule for a new one in a single transaction. Returns the new
    /// id, or `None` with nothing changed when the old rule is missing or
    /// another rule already has the new `(device_id, params)`.
    fn replace_rule(&self, rule_id: u64, rule: &NewRule) -> Result<Option<u64>>;

    /// Deletes one rule. Returns true if a row was removed.
    fn delete_rule(&self, rule_id: u64) -> Result<bool>;

    /// Deletes every rule of a device, returning the number removed.
    fn delete_device_rules(&self, device_id: u64) -> Result<usize>;

    fn update_last_send(&self, rule_id: u64, at: DateTime<Utc>) -> Result<()>;

    /// Replaces the packed custom message, guarded on the rule still having
    /// the given params. Returns false when no row matched.
    fn update_custom_message(&self, rule_id: u64, params: &str, message: &str) -> Result<bool>;
}

/// Read-only view of the device registry.
pub trait DeviceRegistry: Send + Sync {
    fn device_info(&self, device_id: u64) -> Result<Option<DeviceInfo>>;

    /// Smallest recorded cumulative rain total on or after `since`.
    fn rain_min_total_since(&self, device_id: u64, since: NaiveDate) -> Result<Option<f64>>;
}
