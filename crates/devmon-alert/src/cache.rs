use chrono::{DateTime, Utc};
use devmon_common::types::{
    join_custom_message, NewRule, NotificationKind, NotificationRule,
};
use devmon_storage::{DeviceRegistry, RuleBackend};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Prefix of the recovery text armed after an alert.
pub const RECOVERED_PREFIX: &str = "[Recovered] ";

/// The armed recovery text of a rule, only for rules with recovery enabled.
pub fn armed_recovery(rule: &NotificationRule) -> Option<&str> {
    if rule.recovery_enabled() {
        rule.armed_recovery()
    } else {
        None
    }
}

type RuleIndex = BTreeMap<u64, Vec<NotificationRule>>;

/// In-memory index of notification rules keyed by device id.
///
/// The index is a snapshot of the last successful [`reload`](Self::reload).
/// Runtime state (`last_send`, `last_update`, armed recovery text) is updated
/// in place: the backing store first, then the cache, under the index lock.
pub struct RuleCache {
    backend: Arc<dyn RuleBackend>,
    devices: Arc<dyn DeviceRegistry>,
    index: Mutex<RuleIndex>,
}

impl RuleCache {
    pub fn new(backend: Arc<dyn RuleBackend>, devices: Arc<dyn DeviceRegistry>) -> Self {
        Self {
            backend,
            devices,
            index: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock_index(&self) -> MutexGuard<'_, RuleIndex> {
        self.index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rebuilds the index from the backing store and swaps it in.
    ///
    /// On a store failure the previous snapshot is kept.
    pub fn reload(&self) {
        let rules = match self.backend.load_rules() {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load notification rules");
                return;
            }
        };

        let mut index = RuleIndex::new();
        for mut rule in rules {
            if rule.is_kind(NotificationKind::LastUpdate) {
                match self.devices.device_info(rule.device_id) {
                    Ok(Some(device)) => {
                        rule.device_name = device.name;
                        rule.last_update = device.last_update;
                    }
                    Ok(None) => {
                        tracing::warn!(rule_id = rule.id, device_id = rule.device_id, "Stale-update rule for unknown device");
                    }
                    Err(e) => {
                        tracing::error!(rule_id = rule.id, error = %e, "Failed to resolve device for stale-update rule");
                    }
                }
            }
            index.entry(rule.device_id).or_default().push(rule);
        }

        let total: usize = index.values().map(Vec::len).sum();
        *self.lock_index() = index;
        tracing::debug!(rules = total, "Notification rules reloaded");
    }

    /// Persists a new rule. Returns false without touching anything when a
    /// rule with the same `(device_id, params)` already exists.
    pub fn add(&self, rule: NewRule) -> bool {
        match self.backend.find_rule(rule.device_id, &rule.params) {
            Ok(Some(existing)) => {
                tracing::info!(
                    device_id = rule.device_id,
                    params = %rule.params,
                    existing,
                    "Duplicate notification rule rejected"
                );
                return false;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to check for duplicate notification rule");
                return false;
            }
        }

        if let Err(e) = self.backend.insert_rule(&rule) {
            tracing::error!(device_id = rule.device_id, error = %e, "Failed to insert notification rule");
            return false;
        }
        self.reload();
        true
    }

    /// Swaps `rule_id` for `rule` atomically. On failure the old rule is
    /// left untouched.
    pub fn replace(&self, rule_id: u64, rule: NewRule) -> bool {
        match self.backend.replace_rule(rule_id, &rule) {
            Ok(Some(new_id)) => {
                tracing::debug!(rule_id, new_id, params = %rule.params, "Notification rule replaced");
                self.reload();
                true
            }
            Ok(None) => {
                tracing::info!(
                    rule_id,
                    device_id = rule.device_id,
                    params = %rule.params,
                    "Notification rule not replaced, old rule kept"
                );
                false
            }
            Err(e) => {
                tracing::error!(rule_id, error = %e, "Failed to replace notification rule");
                false
            }
        }
    }

    pub fn remove(&self, rule_id: u64) -> bool {
        let removed = match self.backend.delete_rule(rule_id) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!(rule_id, error = %e, "Failed to delete notification rule");
                return false;
            }
        };
        self.reload();
        removed
    }

    pub fn remove_device(&self, device_id: u64) -> usize {
        let removed = match self.backend.delete_device_rules(device_id) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!(device_id, error = %e, "Failed to delete device notification rules");
                return 0;
            }
        };
        self.reload();
        removed
    }

    /// Snapshot of a device's rules.
    pub fn rules(&self, device_id: u64, active_only: bool) -> Vec<NotificationRule> {
        self.lock_index()
            .get(&device_id)
            .map(|rules| {
                rules
                    .iter()
                    .filter(|r| !active_only || r.active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn rule(&self, rule_id: u64) -> Option<NotificationRule> {
        self.lock_index()
            .values()
            .flatten()
            .find(|r| r.id == rule_id)
            .cloned()
    }

    pub fn has_rules(&self, device_id: u64) -> bool {
        self.lock_index()
            .get(&device_id)
            .is_some_and(|rules| !rules.is_empty())
    }

    pub fn all_rules(&self) -> Vec<NotificationRule> {
        self.lock_index().values().flatten().cloned().collect()
    }

    pub fn rules_of_kind(&self, kind: NotificationKind, active_only: bool) -> Vec<NotificationRule> {
        self.lock_index()
            .values()
            .flatten()
            .filter(|r| r.is_kind(kind) && (!active_only || r.active))
            .cloned()
            .collect()
    }

    /// Records a dispatch. `last_send` never moves backward.
    pub fn touch_send(&self, rule_id: u64, at: DateTime<Utc>) -> bool {
        let mut index = self.lock_index();
        let Some(rule) = find_mut(&mut index, rule_id) else {
            return false;
        };
        if rule.last_send.is_some_and(|last| last >= at) {
            return false;
        }
        if let Err(e) = self.backend.update_last_send(rule_id, at) {
            tracing::error!(rule_id, error = %e, "Failed to persist last send time");
            return false;
        }
        rule.last_send = Some(at);
        true
    }

    /// Records a device report for one stale-update rule. Cache only, the
    /// device registry owns the persisted timestamp.
    pub fn touch_update(&self, rule_id: u64, at: DateTime<Utc>) -> bool {
        let mut index = self.lock_index();
        match find_mut(&mut index, rule_id) {
            Some(rule) if rule.last_update.map_or(true, |last| last < at) => {
                rule.last_update = Some(at);
                true
            }
            _ => false,
        }
    }

    /// Touches every stale-update rule of a device.
    pub fn touch_device_update(&self, device_id: u64, at: DateTime<Utc>) {
        let mut index = self.lock_index();
        if let Some(rules) = index.get_mut(&device_id) {
            for rule in rules
                .iter_mut()
                .filter(|r| r.is_kind(NotificationKind::LastUpdate))
            {
                if rule.last_update.map_or(true, |last| last < at) {
                    rule.last_update = Some(at);
                }
            }
        }
    }

    /// The alert half of the custom message, if set.
    pub fn peek_alert_template(&self, rule_id: u64) -> Option<String> {
        let index = self.lock_index();
        index
            .values()
            .flatten()
            .find(|r| r.id == rule_id)
            .map(|r| r.alert_template().to_string())
            .filter(|t| !t.is_empty())
    }

    /// The armed recovery text, only for recovery-enabled rules.
    pub fn peek_recovery(&self, rule_id: u64) -> Option<String> {
        let index = self.lock_index();
        index
            .values()
            .flatten()
            .find(|r| r.id == rule_id)
            .and_then(|r| armed_recovery(r).map(String::from))
    }

    /// Arms `"[Recovered] <alert_text>"` as the recovery half. No-op for
    /// rules without recovery enabled.
    pub fn arm_recovery(&self, rule_id: u64, alert_text: &str) -> bool {
        self.set_recovery(rule_id, &format!("{RECOVERED_PREFIX}{alert_text}"))
    }

    pub fn clear_recovery(&self, rule_id: u64) -> bool {
        self.set_recovery(rule_id, "")
    }

    fn set_recovery(&self, rule_id: u64, recovery: &str) -> bool {
        let mut index = self.lock_index();
        let Some(rule) = find_mut(&mut index, rule_id) else {
            return false;
        };
        if !rule.recovery_enabled() {
            return false;
        }
        let message = join_custom_message(rule.alert_template(), recovery);
        match self
            .backend
            .update_custom_message(rule_id, &rule.params, &message)
        {
            Ok(true) => {
                rule.custom_message = message;
                true
            }
            Ok(false) => {
                tracing::warn!(rule_id, "Rule changed before recovery text could be stored");
                false
            }
            Err(e) => {
                tracing::error!(rule_id, error = %e, "Failed to persist recovery text");
                false
            }
        }
    }
}

fn find_mut(index: &mut RuleIndex, rule_id: u64) -> Option<&mut NotificationRule> {
    index.values_mut().flatten().find(|r| r.id == rule_id)
}
