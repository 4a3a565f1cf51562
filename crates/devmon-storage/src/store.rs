use crate::error::{Result, StorageError};
use crate::{DeviceRegistry, RuleBackend};
use chrono::{DateTime, NaiveDate, Utc};
use devmon_common::types::{DeviceInfo, NewRule, NotificationRule, SwitchType};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const NOTIFICATIONS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_row_id INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    params TEXT NOT NULL,
    custom_message TEXT NOT NULL DEFAULT '',
    custom_action TEXT NOT NULL DEFAULT '',
    active_channels TEXT NOT NULL DEFAULT '',
    priority INTEGER NOT NULL DEFAULT 0,
    send_always INTEGER NOT NULL DEFAULT 0,
    last_send TEXT NOT NULL DEFAULT '0'
);
CREATE INDEX IF NOT EXISTS idx_notifications_device
    ON notifications(device_row_id);
";

const DEVICES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS device_status (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    switch_type TEXT NOT NULL DEFAULT 'on_off',
    custom_image INTEGER NOT NULL DEFAULT 0,
    options TEXT NOT NULL DEFAULT '',
    addj_value REAL NOT NULL DEFAULT 0,
    addj_multi REAL NOT NULL DEFAULT 1,
    meter_type INTEGER NOT NULL DEFAULT 0,
    last_update TEXT
);
CREATE TABLE IF NOT EXISTS rain (
    device_row_id INTEGER NOT NULL,
    total REAL NOT NULL,
    date TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rain_device_date
    ON rain(device_row_id, date);
";

const RULE_COLUMNS: &str = "id, device_row_id, active, params, custom_message, custom_action, \
     active_channels, priority, send_always, last_send";

/// SQLite-backed rule store and device registry.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(NOTIFICATIONS_SCHEMA)?;
        conn.execute_batch(DEVICES_SCHEMA)?;
        tracing::debug!("Notification store schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts or replaces a device registry row.
    pub fn upsert_device(&self, device: &DeviceInfo) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT OR REPLACE INTO device_status
                (id, name, switch_type, custom_image, options, addj_value, addj_multi, meter_type, last_update)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                device.id as i64,
                &device.name,
                device.switch_type.as_str(),
                device.custom_image,
                &device.options,
                device.addj_value,
                device.addj_multi,
                device.meter_type,
                device.last_update.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Stamps the last report time of a device.
    pub fn touch_device(&self, device_id: u64, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock_conn();
        let changed = conn.execute(
            "UPDATE device_status SET last_update = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), device_id as i64],
        )?;
        Ok(changed > 0)
    }

    /// Appends one cumulative rain total sample.
    pub fn record_rain_total(&self, device_id: u64, total: f64, date: NaiveDate) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO rain (device_row_id, total, date) VALUES (?1, ?2, ?3)",
            params![device_id as i64, total, date.format("%Y-%m-%d").to_string()],
        )?;
        Ok(())
    }

    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, switch_type, custom_image, options, addj_value, addj_multi, meter_type, last_update
             FROM device_status ORDER BY id",
        )?;
        let rows = stmt.query_map([], raw_device)?;
        let mut devices = Vec::new();
        for row in rows {
            devices.push(device_from_raw(row?)?);
        }
        Ok(devices)
    }
}

struct RawRule {
    id: i64,
    device_id: i64,
    active: bool,
    params: String,
    custom_message: String,
    custom_action: String,
    active_channels: String,
    priority: i32,
    send_always: bool,
    last_send: String,
}

fn raw_rule(row: &Row<'_>) -> rusqlite::Result<RawRule> {
    Ok(RawRule {
        id: row.get(0)?,
        device_id: row.get(1)?,
        active: row.get(2)?,
        params: row.get(3)?,
        custom_message: row.get(4)?,
        custom_action: row.get(5)?,
        active_channels: row.get(6)?,
        priority: row.get(7)?,
        send_always: row.get(8)?,
        last_send: row.get(9)?,
    })
}

fn rule_from_raw(raw: RawRule) -> Result<NotificationRule> {
    Ok(NotificationRule {
        id: raw.id as u64,
        device_id: raw.device_id as u64,
        device_name: String::new(),
        active: raw.active,
        params: raw.params,
        custom_message: raw.custom_message,
        custom_action: raw.custom_action,
        active_channels: split_channels(&raw.active_channels),
        priority: raw.priority,
        send_always: raw.send_always,
        last_send: parse_last_send(&raw.last_send)?,
        last_update: None,
    })
}

type RawDevice = (i64, String, String, i32, String, f64, f64, i32, Option<String>);

fn raw_device(row: &Row<'_>) -> rusqlite::Result<RawDevice> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn device_from_raw(raw: RawDevice) -> Result<DeviceInfo> {
    let (id, name, switch_type, custom_image, options, addj_value, addj_multi, meter_type, last) =
        raw;
    let switch_type: SwitchType =
        switch_type
            .parse()
            .map_err(|_| StorageError::UnexpectedValue {
                column: "switch_type",
                value: switch_type.clone(),
            })?;
    let last_update = match last {
        Some(s) if !s.is_empty() => Some(parse_timestamp("last_update", &s)?),
        _ => None,
    };
    Ok(DeviceInfo {
        id: id as u64,
        name,
        switch_type,
        custom_image,
        options,
        addj_value,
        addj_multi,
        meter_type,
        last_update,
    })
}

fn split_channels(joined: &str) -> Vec<String> {
    joined
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp {
            column,
            value: value.to_string(),
        })
}

/// `"0"` (or empty) means the rule never sent.
fn parse_last_send(value: &str) -> Result<Option<DateTime<Utc>>> {
    match value {
        "" | "0" => Ok(None),
        v => parse_timestamp("last_send", v).map(Some),
    }
}

fn insert_rule_row(conn: &Connection, rule: &NewRule) -> Result<u64> {
    conn.execute(
        "INSERT INTO notifications
            (device_row_id, active, params, custom_message, custom_action, active_channels, priority, send_always, last_send)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, '0')",
        params![
            rule.device_id as i64,
            rule.active,
            &rule.params,
            &rule.custom_message,
            &rule.custom_action,
            rule.active_channels.join(";"),
            rule.priority,
            rule.send_always,
        ],
    )?;
    Ok(conn.last_insert_rowid() as u64)
}

impl RuleBackend for SqliteStore {
    fn load_rules(&self) -> Result<Vec<NotificationRule>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RULE_COLUMNS} FROM notifications ORDER BY device_row_id, id"
        ))?;
        let rows = stmt.query_map([], raw_rule)?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(rule_from_raw(row?)?);
        }
        Ok(rules)
    }

    fn find_rule(&self, device_id: u64, params: &str) -> Result<Option<u64>> {
        let conn = self.lock_conn();
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM notifications WHERE device_row_id = ?1 AND params = ?2",
                params![device_id as i64, params],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(|id| id as u64))
    }

    fn insert_rule(&self, rule: &NewRule) -> Result<u64> {
        let conn = self.lock_conn();
        insert_rule_row(&conn, rule)
    }

    fn replace_rule(&self, rule_id: u64, rule: &NewRule) -> Result<Option<u64>> {
        let conn = self.lock_conn();
        let tx = conn.unchecked_transaction()?;

        let removed = tx.execute(
            "DELETE FROM notifications WHERE id = ?1",
            params![rule_id as i64],
        )?;
        if removed == 0 {
            return Ok(None);
        }
        let clash: Option<i64> = tx
            .query_row(
                "SELECT id FROM notifications WHERE device_row_id = ?1 AND params = ?2",
                params![rule.device_id as i64, &rule.params],
                |row| row.get(0),
            )
            .optional()?;
        if clash.is_some() {
            return Ok(None);
        }

        let id = insert_rule_row(&tx, rule)?;
        tx.commit()?;
        Ok(Some(id))
    }

    fn delete_rule(&self, rule_id: u64) -> Result<bool> {
        let conn = self.lock_conn();
        let removed = conn.execute(
            "DELETE FROM notifications WHERE id = ?1",
            params![rule_id as i64],
        )?;
        Ok(removed > 0)
    }

    fn delete_device_rules(&self, device_id: u64) -> Result<usize> {
        let conn = self.lock_conn();
        let removed = conn.execute(
            "DELETE FROM notifications WHERE device_row_id = ?1",
            params![device_id as i64],
        )?;
        Ok(removed)
    }

    fn update_last_send(&self, rule_id: u64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock_conn();
        let changed = conn.execute(
            "UPDATE notifications SET last_send = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), rule_id as i64],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "notification",
                id: rule_id.to_string(),
            });
        }
        Ok(())
    }

    fn update_custom_message(&self, rule_id: u64, params: &str, message: &str) -> Result<bool> {
        let conn = self.lock_conn();
        let changed = conn.execute(
            "UPDATE notifications SET custom_message = ?1 WHERE id = ?2 AND params = ?3",
            params![message, rule_id as i64, params],
        )?;
        Ok(changed > 0)
    }
}

impl DeviceRegistry for SqliteStore {
    fn device_info(&self, device_id: u64) -> Result<Option<DeviceInfo>> {
        let raw = {
            let conn = self.lock_conn();
            conn.query_row(
                "SELECT id, name, switch_type, custom_image, options, addj_value, addj_multi, meter_type, last_update
                 FROM device_status WHERE id = ?1",
                params![device_id as i64],
                raw_device,
            )
            .optional()?
        };
        raw.map(device_from_raw).transpose()
    }

    fn rain_min_total_since(&self, device_id: u64, since: NaiveDate) -> Result<Option<f64>> {
        let conn = self.lock_conn();
        let min: Option<f64> = conn.query_row(
            "SELECT MIN(total) FROM rain WHERE device_row_id = ?1 AND date >= ?2",
            params![device_id as i64, since.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )?;
        Ok(min)
    }
}
