use crate::cache::{armed_recovery, RuleCache};
use crate::compare::{apply_rule, Comparator};
use crate::normalizer::{normalize, Check};
use chrono::{DateTime, Duration, Local, Utc};
use devmon_common::types::{
    parse_lenient_f64, DeviceInfo, DeviceReport, DeviceType, GeneralKind, NotificationKind,
    NotificationRule, SwitchType,
};
use devmon_notify::dispatcher::{DispatchRequest, Dispatcher};
use devmon_storage::DeviceRegistry;
use std::sync::Arc;

/// Unit the user enters temperature thresholds in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl std::str::FromStr for TempUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "celsius" => Ok(Self::Celsius),
            "f" | "fahrenheit" => Ok(Self::Fahrenheit),
            _ => Err(format!("unknown temperature unit: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Minimum time between two sends of one sensor rule.
    pub sensor_interval: Duration,
    /// Minimum time between two sends of one switch rule.
    pub switch_interval: Duration,
    pub temp_unit: TempUnit,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sensor_interval: Duration::hours(12),
            switch_interval: Duration::zero(),
            temp_unit: TempUnit::Celsius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchEdge {
    On,
    Off,
}

impl SwitchEdge {
    pub fn kind(self) -> NotificationKind {
        match self {
            Self::On => NotificationKind::SwitchOn,
            Self::Off => NotificationKind::SwitchOff,
        }
    }
}

/// Substitutes `$name` and `$value` in a user template.
pub fn render_custom_message(template: &str, name: &str, value: &str) -> String {
    template.replace("$name", name).replace("$value", value)
}

/// Default alert text and template inputs for one evaluation.
pub(crate) struct AlertText {
    pub text: String,
    /// Substituted for `$value` in custom templates.
    pub value: String,
    pub extra_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    Alert { armed: bool },
    Recover(String),
    Hold,
}

pub(crate) fn transition(rule: &NotificationRule, breach: bool) -> Transition {
    match (breach, armed_recovery(rule)) {
        (true, None) => Transition::Alert { armed: false },
        (true, Some(_)) if rule.send_always => Transition::Alert { armed: true },
        (false, Some(text)) => Transition::Recover(text.to_string()),
        _ => Transition::Hold,
    }
}

pub(crate) fn throttle_open(rule: &NotificationRule, interval: Duration, now: DateTime<Utc>) -> bool {
    rule.send_always || rule.last_send.map_or(true, |last| now - interval >= last)
}

fn to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

fn temp_image(temp: f64) -> &'static str {
    match temp {
        t if t > 30.0 => "temp-gt-30",
        t if t > 25.0 => "temp-25-30",
        t if t > 20.0 => "temp-20-25",
        t if t > 15.0 => "temp-15-20",
        t if t > 10.0 => "temp-10-15",
        t if t > 5.0 => "temp-5-10",
        _ => "temp48",
    }
}

/// Status text and optional image for a switch edge.
fn switch_text(switch_type: SwitchType, edge: SwitchEdge) -> (&'static str, Option<&'static str>) {
    match (edge, switch_type) {
        (SwitchEdge::On, SwitchType::Doorbell) => ("pressed", None),
        (SwitchEdge::On, SwitchType::Contact) => ("Open", Some("Contact48_On")),
        (SwitchEdge::On, SwitchType::DoorContact) => ("Open", Some("Door48_On")),
        (SwitchEdge::On, SwitchType::DoorLock) => ("Locked", Some("Door48_Off")),
        (SwitchEdge::On, SwitchType::DoorLockInverted) => ("Unlocked", Some("Door48_On")),
        (SwitchEdge::On, SwitchType::Motion) => ("movement detected", None),
        (SwitchEdge::On, SwitchType::Smoke) => ("ALARM/FIRE !", None),
        (SwitchEdge::On, _) => (">> ON", None),
        (SwitchEdge::Off, SwitchType::Contact | SwitchType::DoorContact) => ("Closed", None),
        (SwitchEdge::Off, SwitchType::DoorLock) => ("Unlocked", Some("Door48_On")),
        (SwitchEdge::Off, SwitchType::DoorLockInverted) => ("Locked", Some("Door48_Off")),
        (SwitchEdge::Off, _) => (">> OFF", None),
    }
}

fn switch_extra(device: &DeviceInfo) -> String {
    format!(
        "|Name={}|SwitchType={}|CustomImage={}|",
        device.name, device.switch_type, device.custom_image
    )
}

/// `%.0f` for integral values, `%.1f` otherwise.
fn format_reading(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn with_label(label: &str) -> String {
    if label.is_empty() {
        String::new()
    } else {
        format!(" {label}")
    }
}

/// Evaluates rules against incoming readings and drives dispatch.
///
/// Threshold kinds pair every alert with a later recovery message; fixed
/// events (switches, dew point, values, alert text) only honour the throttle.
pub struct NotificationEngine {
    cache: Arc<RuleCache>,
    devices: Arc<dyn DeviceRegistry>,
    dispatcher: Arc<Dispatcher>,
    settings: EngineSettings,
}

impl NotificationEngine {
    pub fn new(
        cache: Arc<RuleCache>,
        devices: Arc<dyn DeviceRegistry>,
        dispatcher: Arc<Dispatcher>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            cache,
            devices,
            dispatcher,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<RuleCache> {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub(crate) fn device(&self, device_id: u64) -> Option<DeviceInfo> {
        match self.devices.device_info(device_id) {
            Ok(device) => device,
            Err(e) => {
                tracing::error!(device_id, error = %e, "Failed to read device registry");
                None
            }
        }
    }

    /// Active rules of a device, refreshing its stale-update rules first.
    fn sensor_rules(&self, device_id: u64, now: DateTime<Utc>) -> Vec<NotificationRule> {
        self.cache.touch_device_update(device_id, now);
        self.cache.rules(device_id, true)
    }

    /// Runs one raw report through the normalizer and every resulting check.
    /// Returns the number of messages dispatched.
    pub async fn handle_report(&self, report: &DeviceReport) -> usize {
        let Some(device_id) = report.row_id else {
            return 0;
        };
        if !self.cache.has_rules(device_id) {
            return 0;
        }

        let device = match report.device {
            DeviceType::General(GeneralKind::Visibility | GeneralKind::Distance) => {
                self.device(device_id)
            }
            _ => None,
        };

        let name = report.name.as_str();
        let mut sent = 0;
        for check in normalize(report, device.as_ref()) {
            sent += match check {
                Check::TempHumidity { temp, humidity } => {
                    self.check_temp_humidity(device_id, name, temp, humidity).await
                }
                Check::DewPoint { temp, dew_point } => {
                    self.check_dew_point(device_id, name, temp, dew_point).await
                }
                Check::Threshold { kind, value } => {
                    self.check_threshold(device_id, name, kind, value).await
                }
                Check::Rain { value, rate } => self.check_rain(device_id, name, value, rate).await,
                Check::Ampere(phases) => self.check_ampere(device_id, name, phases).await,
                Check::AlertText(text) => self.check_alert_text(device_id, name, &text).await,
            };
        }
        sent
    }

    pub async fn check_temp_humidity(
        &self,
        device_id: u64,
        name: &str,
        temp: Option<f64>,
        humidity: Option<i32>,
    ) -> usize {
        let settings = self.settings();
        let now = Utc::now();
        let mut sent = 0;

        for rule in self.sensor_rules(device_id, now) {
            let armed = armed_recovery(&rule).is_some();
            if !armed && !throttle_open(&rule, settings.sensor_interval, now) {
                continue;
            }
            let fields = rule.param_fields();
            if fields.len() < 3 {
                continue;
            }
            let op = fields[1];
            let mut threshold = parse_lenient_f64(fields[2]);

            let (breach, alert) = match (rule.kind(), temp, humidity) {
                (Some(NotificationKind::Temperature), Some(t), _) => {
                    if settings.temp_unit == TempUnit::Fahrenheit {
                        threshold = to_celsius(threshold);
                    }
                    (
                        apply_rule(op, t == threshold, t < threshold),
                        AlertText {
                            text: format!(
                                "{name} Temperature is {t:.1} degrees [{op} {threshold:.1} degrees]"
                            ),
                            value: format!("{t:.1}"),
                            extra_data: format!("|Name={name}|Image={}|", temp_image(t)),
                        },
                    )
                }
                (Some(NotificationKind::Humidity), _, Some(h)) => {
                    let h_value = f64::from(h);
                    (
                        apply_rule(op, h_value == threshold, h_value < threshold),
                        AlertText {
                            text: format!("{name} Humidity is {h} % [{op} {threshold:.0} %]"),
                            value: h.to_string(),
                            extra_data: format!("|Name={name}|Image=moisture48|"),
                        },
                    )
                }
                _ => continue,
            };

            if self.apply_transition(&rule, device_id, name, breach, alert, now).await {
                sent += 1;
            }
        }
        sent
    }

    pub async fn check_dew_point(&self, device_id: u64, name: &str, temp: f64, dew_point: f64) -> usize {
        let interval = self.settings().sensor_interval;
        let now = Utc::now();
        let mut sent = 0;

        for rule in self.sensor_rules(device_id, now) {
            if !rule.is_kind(NotificationKind::DewPoint) || !throttle_open(&rule, interval, now) {
                continue;
            }
            if temp <= dew_point {
                let alert = AlertText {
                    text: format!("{name} Dew Point reached ({temp:.1} degrees)"),
                    value: format!("{temp:.1}"),
                    extra_data: format!("|Name={name}|Image=temp-0-5|"),
                };
                self.fire_event(&rule, device_id, name, alert, now).await;
                sent += 1;
            }
        }
        sent
    }

    /// Value rules fire whenever the reading is strictly above the threshold.
    pub async fn check_value(&self, device_id: u64, name: &str, value: i64) -> usize {
        let interval = self.settings().sensor_interval;
        let now = Utc::now();
        let mut sent = 0;

        for rule in self.sensor_rules(device_id, now) {
            if !rule.is_kind(NotificationKind::Value) || !throttle_open(&rule, interval, now) {
                continue;
            }
            let fields = rule.param_fields();
            if fields.len() < 2 {
                continue;
            }
            // Accept both `F;<threshold>` and `F;<op>;<threshold>`.
            let raw = if fields[1].parse::<Comparator>().is_ok() {
                fields.get(2).copied().unwrap_or_default()
            } else {
                fields[1]
            };
            let threshold = parse_lenient_f64(raw) as i64;
            if value > threshold {
                let alert = AlertText {
                    text: format!("{name} is {value}"),
                    value: value.to_string(),
                    extra_data: format!("|Name={name}|"),
                };
                self.fire_event(&rule, device_id, name, alert, now).await;
                sent += 1;
            }
        }
        sent
    }

    pub async fn check_ampere(&self, device_id: u64, name: &str, phases: [f64; 3]) -> usize {
        let interval = self.settings().sensor_interval;
        let now = Utc::now();
        let mut sent = 0;

        for rule in self.sensor_rules(device_id, now) {
            let ampere = match rule.kind() {
                Some(NotificationKind::Ampere1) => phases[0],
                Some(NotificationKind::Ampere2) => phases[1],
                Some(NotificationKind::Ampere3) => phases[2],
                _ => continue,
            };
            let armed = armed_recovery(&rule).is_some();
            if !armed && !throttle_open(&rule, interval, now) {
                continue;
            }
            let fields = rule.param_fields();
            if fields.len() < 3 {
                continue;
            }
            let op = fields[1];
            let threshold = parse_lenient_f64(fields[2]);
            let description = rule.kind().map(|k| k.description()).unwrap_or_default();

            let alert = AlertText {
                text: format!(
                    "{name} {description} is {ampere:.1} Ampere [{op} {threshold:.1} Ampere]"
                ),
                value: format!("{ampere:.1}"),
                extra_data: format!("|Name={name}|Image=current48|"),
            };
            let breach = apply_rule(op, ampere == threshold, ampere < threshold);
            if self.apply_transition(&rule, device_id, name, breach, alert, now).await {
                sent += 1;
            }
        }
        sent
    }

    /// Generic threshold evaluation for kinds without a dedicated text.
    pub async fn check_threshold(
        &self,
        device_id: u64,
        name: &str,
        kind: NotificationKind,
        value: f64,
    ) -> usize {
        let Some(device) = self.device(device_id) else {
            return 0;
        };
        let interval = self.settings().sensor_interval;
        let now = Utc::now();
        let reading = format_reading(value);
        let label = with_label(kind.label());
        let extra_data = format!("|Name={name}|SwitchType={}|", device.switch_type);
        let mut sent = 0;

        for rule in self.sensor_rules(device_id, now) {
            if !rule.is_kind(kind) {
                continue;
            }
            let armed = armed_recovery(&rule).is_some();
            if !armed && !throttle_open(&rule, interval, now) {
                continue;
            }
            let fields = rule.param_fields();
            if fields.len() < 3 {
                continue;
            }
            let op = fields[1];
            let threshold = parse_lenient_f64(fields[2]);

            let alert = AlertText {
                text: format!(
                    "{name} {} is {reading}{label} [{op} {threshold:.1}{label}]",
                    kind.description()
                ),
                value: reading.clone(),
                extra_data: extra_data.clone(),
            };
            let breach = apply_rule(op, value == threshold, value < threshold);
            if self.apply_transition(&rule, device_id, name, breach, alert, now).await {
                sent += 1;
            }
        }
        sent
    }

    /// Rain rules. Counter payloads are reduced to today's delta first.
    pub async fn check_rain(&self, device_id: u64, name: &str, value: f64, rate: bool) -> usize {
        let Some(device) = self.device(device_id) else {
            return 0;
        };

        let total = if rate {
            value * device.addj_multi
        } else {
            let today = Local::now().date_naive();
            let min = match self.devices.rain_min_total_since(device_id, today) {
                Ok(min) => min.unwrap_or(0.0),
                Err(e) => {
                    tracing::error!(device_id, error = %e, "Failed to read rain totals");
                    return 0;
                }
            };
            (value - min) * device.addj_multi
        };

        self.check_threshold(device_id, name, NotificationKind::Rain, total)
            .await
    }

    /// Plain on/off transition of a switch device.
    pub async fn check_switch(&self, device_id: u64, edge: SwitchEdge) -> usize {
        let Some(device) = self.device(device_id) else {
            return 0;
        };
        let interval = self.settings().switch_interval;
        let now = Utc::now();
        let (status, image) = switch_text(device.switch_type, edge);

        let mut extra_data = switch_extra(&device);
        extra_data.push_str(match edge {
            SwitchEdge::On => "Status=On|",
            SwitchEdge::Off => "Status=Off|",
        });
        if let Some(image) = image {
            extra_data.push_str(&format!("Image={image}|"));
        }

        let mut sent = 0;
        for rule in self.cache.rules(device_id, true) {
            if !rule.is_kind(edge.kind()) || !throttle_open(&rule, interval, now) {
                continue;
            }
            let alert = AlertText {
                text: format!("{} {status}", device.name),
                value: status.to_string(),
                extra_data: extra_data.clone(),
            };
            self.fire_event(&rule, device_id, &device.name, alert, now)
                .await;
            sent += 1;
        }
        sent
    }

    /// Dimmer or selector transition. On-rules of shape `S;=;<level>` fire
    /// when the reported level matches, off-rules fire on every off.
    pub async fn check_switch_level(&self, device_id: u64, edge: SwitchEdge, level: i32) -> usize {
        let Some(device) = self.device(device_id) else {
            return 0;
        };
        let interval = self.settings().switch_interval;
        let now = Utc::now();
        let base_extra = switch_extra(&device);

        let mut sent = 0;
        for rule in self.cache.rules(device_id, true) {
            if !rule.is_kind(edge.kind()) || !throttle_open(&rule, interval, now) {
                continue;
            }

            let (status, extra_data) = match edge {
                SwitchEdge::On => {
                    let fields = rule.param_fields();
                    if fields.len() < 3 || fields[1] != "=" {
                        continue;
                    }
                    let wanted = parse_lenient_f64(fields[2]) as i32;
                    if !(10..=100).contains(&wanted) || wanted != level {
                        continue;
                    }
                    let level_name = if device.switch_type == SwitchType::Selector {
                        usize::try_from(level / 10)
                            .ok()
                            .and_then(|i| device.level_names().get(i).map(|n| n.to_string()))
                    } else {
                        None
                    };
                    let status = match level_name {
                        Some(level_name) => format!(">> {level_name}"),
                        None => format!(">> LEVEL {level}"),
                    };
                    (status, format!("{base_extra}Status=Level {level}|"))
                }
                SwitchEdge::Off => (">> OFF".to_string(), format!("{base_extra}Status=Off|")),
            };

            let alert = AlertText {
                text: format!("{} {status}", device.name),
                value: status,
                extra_data,
            };
            self.fire_event(&rule, device_id, &device.name, alert, now)
                .await;
            sent += 1;
        }
        sent
    }

    /// Free-form alert text. Every active rule of the device except
    /// stale-update rules dispatches it.
    pub async fn check_alert_text(&self, device_id: u64, name: &str, text: &str) -> usize {
        let interval = self.settings().sensor_interval;
        let now = Utc::now();
        let mut sent = 0;

        for rule in self.sensor_rules(device_id, now) {
            if rule.is_kind(NotificationKind::LastUpdate) || !throttle_open(&rule, interval, now) {
                continue;
            }
            let alert = AlertText {
                text: text.to_string(),
                value: text.to_string(),
                extra_data: String::new(),
            };
            self.fire_event(&rule, device_id, name, alert, now).await;
            sent += 1;
        }
        sent
    }

    /// Dispatches a caller-supplied message to the device's rules of `kind`.
    pub async fn check_event(&self, device_id: u64, kind: NotificationKind, message: &str) -> usize {
        let Some(device) = self.device(device_id) else {
            return 0;
        };
        let interval = self.settings().sensor_interval;
        let now = Utc::now();
        let extra_data = switch_extra(&device);
        let mut sent = 0;

        for rule in self.sensor_rules(device_id, now) {
            if !rule.is_kind(kind) || !throttle_open(&rule, interval, now) {
                continue;
            }
            let alert = AlertText {
                text: message.to_string(),
                value: String::new(),
                extra_data: extra_data.clone(),
            };
            self.fire_event(&rule, device_id, &device.name, alert, now)
                .await;
            sent += 1;
        }
        sent
    }

    /// Sends a fixed event: the custom template if set, else the default text.
    async fn fire_event(
        &self,
        rule: &NotificationRule,
        device_id: u64,
        name: &str,
        alert: AlertText,
        now: DateTime<Utc>,
    ) {
        let template = rule.alert_template();
        let text = if template.is_empty() {
            alert.text
        } else {
            render_custom_message(template, name, &alert.value)
        };
        self.send(rule, device_id, name, &text, alert.extra_data).await;
        self.cache.touch_send(rule.id, now);
    }

    async fn apply_transition(
        &self,
        rule: &NotificationRule,
        device_id: u64,
        name: &str,
        breach: bool,
        alert: AlertText,
        now: DateTime<Utc>,
    ) -> bool {
        match transition(rule, breach) {
            Transition::Alert { armed } => {
                self.deliver_alert(rule, device_id, name, alert, armed, now)
                    .await;
                true
            }
            Transition::Recover(text) => {
                self.deliver_recovery(rule, device_id, name, &text, alert.extra_data, now)
                    .await;
                true
            }
            Transition::Hold => false,
        }
    }

    pub(crate) async fn deliver_alert(
        &self,
        rule: &NotificationRule,
        device_id: u64,
        name: &str,
        alert: AlertText,
        armed: bool,
        now: DateTime<Utc>,
    ) {
        let template = rule.alert_template();
        let text = if !armed && !template.is_empty() {
            render_custom_message(template, name, &alert.value)
        } else {
            alert.text
        };
        self.send(rule, device_id, name, &text, alert.extra_data).await;
        self.cache.touch_send(rule.id, now);
        if !armed {
            self.cache.arm_recovery(rule.id, &text);
        }
    }

    pub(crate) async fn deliver_recovery(
        &self,
        rule: &NotificationRule,
        device_id: u64,
        name: &str,
        text: &str,
        extra_data: String,
        now: DateTime<Utc>,
    ) {
        self.send(rule, device_id, name, text, extra_data).await;
        self.cache.clear_recovery(rule.id);
        self.cache.touch_send(rule.id, now);
    }

    async fn send(
        &self,
        rule: &NotificationRule,
        device_id: u64,
        name: &str,
        text: &str,
        extra_data: String,
    ) {
        tracing::info!(
            rule_id = rule.id,
            device_id,
            params = %rule.params,
            message = %text,
            "Dispatching notification"
        );
        self.dispatcher
            .dispatch(DispatchRequest {
                device_id,
                device_name: name.to_string(),
                allowed_channels: rule.active_channels.clone(),
                custom_action: rule.custom_action.clone(),
                subject: text.to_string(),
                body: text.to_string(),
                extra_data,
                priority: rule.priority,
                sound: String::new(),
                from_event: true,
            })
            .await;
    }
}
