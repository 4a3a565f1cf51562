use crate::cache::armed_recovery;
use crate::compare::apply_rule;
use crate::engine::{throttle_open, transition, AlertText, NotificationEngine, Transition};
use chrono::{DateTime, Local, Utc};
use devmon_common::types::{parse_lenient_f64, NotificationKind};
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Seconds since the host booted.
pub fn host_uptime_secs() -> u64 {
    sysinfo::System::uptime()
}

/// Periodically alerts on devices that stopped reporting.
pub struct StaleDeviceWatchdog {
    engine: Arc<NotificationEngine>,
    started_at: DateTime<Utc>,
    tick_secs: u64,
}

impl StaleDeviceWatchdog {
    pub fn new(engine: Arc<NotificationEngine>, started_at: DateTime<Utc>, tick_secs: u64) -> Self {
        Self {
            engine,
            started_at,
            tick_secs,
        }
    }

    pub async fn run(&self) {
        tracing::info!(tick_secs = self.tick_secs, "Stale device watchdog started");

        let mut tick = interval(Duration::from_secs(self.tick_secs.max(1)));
        loop {
            tick.tick().await;
            let sent = self.sweep(Utc::now(), host_uptime_secs()).await;
            if sent > 0 {
                tracing::info!(sent, "Stale device sweep dispatched notifications");
            }
        }
    }

    /// One pass over every stale-update rule with a known last report.
    ///
    /// Alerts are held back while either this process or the host has been
    /// up for less than the rule's timeout. Returns the number dispatched.
    pub async fn sweep(&self, now: DateTime<Utc>, host_uptime_secs: u64) -> usize {
        let sensor_interval = self.engine.settings().sensor_interval;
        let process_age = now - self.started_at;
        let mut sent = 0;

        for rule in self
            .engine
            .cache()
            .rules_of_kind(NotificationKind::LastUpdate, true)
        {
            let Some(last_update) = rule.last_update else {
                continue;
            };
            if armed_recovery(&rule).is_none() && !throttle_open(&rule, sensor_interval, now) {
                continue;
            }
            let fields = rule.param_fields();
            if fields.len() < 3 {
                continue;
            }
            let op = fields[1];
            let timeout_min = parse_lenient_f64(fields[2]).max(0.0) as i64;
            let Some(timeout_secs) = timeout_min.checked_mul(60) else {
                tracing::warn!(
                    rule_id = rule.id,
                    device_id = rule.device_id,
                    params = %rule.params,
                    "Stale-update timeout out of range, rule skipped"
                );
                continue;
            };

            let elapsed = ((now - last_update).num_milliseconds() as f64 / 1000.0).round() as i64;
            let breach = apply_rule(op, elapsed == timeout_secs, elapsed < timeout_secs);

            match transition(&rule, breach) {
                Transition::Alert { armed } => {
                    if process_age.num_seconds() < timeout_secs {
                        continue;
                    }
                    if i64::try_from(host_uptime_secs).unwrap_or(i64::MAX) < timeout_secs {
                        continue;
                    }
                    let Some(device) = self.engine.device(rule.device_id) else {
                        continue;
                    };

                    let stamp = last_update
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M:%S");
                    let text = format!(
                        "Sensor {} Last Update: {stamp} [{op} {timeout_min} min]",
                        rule.device_name
                    );
                    let alert = AlertText {
                        text,
                        value: String::new(),
                        extra_data: format!(
                            "|Name={}|SwitchType={}|",
                            rule.device_name, device.switch_type
                        ),
                    };
                    tracing::warn!(
                        rule_id = rule.id,
                        device_id = rule.device_id,
                        elapsed_secs = elapsed,
                        timeout_min,
                        "Device stopped reporting"
                    );
                    self.engine
                        .deliver_alert(&rule, rule.device_id, &rule.device_name, alert, armed, now)
                        .await;
                    sent += 1;
                }
                Transition::Recover(text) => {
                    self.engine
                        .deliver_recovery(&rule, rule.device_id, &rule.device_name, &text, String::new(), now)
                        .await;
                    sent += 1;
                }
                Transition::Hold => {}
            }
        }
        sent
    }
}
