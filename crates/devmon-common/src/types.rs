use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator between the alert and recovery halves of a rule's custom message.
pub const CUSTOM_MESSAGE_SEPARATOR: &str = ";;";

/// Canonical alert category every raw device reading is mapped into.
///
/// Each kind is identified in rule params by a one-character tag.
///
/// # Examples
///
/// ```
/// use devmon_common::types::NotificationKind;
///
/// let kind: NotificationKind = "T".parse().unwrap();
/// assert_eq!(kind, NotificationKind::Temperature);
/// assert_eq!(kind.tag(), "T");
/// assert_eq!(kind.label(), "degrees");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Temperature,
    Humidity,
    Rain,
    Uv,
    Wind,
    Usage,
    Baro,
    SwitchOn,
    SwitchOff,
    Ampere1,
    Ampere2,
    Ampere3,
    TodayCounter,
    Percentage,
    DewPoint,
    Setpoint,
    Value,
    LastUpdate,
    Alert,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 19] = [
        Self::Temperature,
        Self::Humidity,
        Self::Rain,
        Self::Uv,
        Self::Wind,
        Self::Usage,
        Self::Baro,
        Self::SwitchOn,
        Self::SwitchOff,
        Self::Ampere1,
        Self::Ampere2,
        Self::Ampere3,
        Self::TodayCounter,
        Self::Percentage,
        Self::DewPoint,
        Self::Setpoint,
        Self::Value,
        Self::LastUpdate,
        Self::Alert,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Temperature => "T",
            Self::Humidity => "H",
            Self::Rain => "R",
            Self::Uv => "U",
            Self::Wind => "W",
            Self::Usage => "M",
            Self::Baro => "B",
            Self::SwitchOn => "S",
            Self::SwitchOff => "O",
            Self::Ampere1 => "1",
            Self::Ampere2 => "2",
            Self::Ampere3 => "3",
            Self::TodayCounter => "C",
            Self::Percentage => "P",
            Self::DewPoint => "D",
            Self::Setpoint => "N",
            Self::Value => "F",
            Self::LastUpdate => "J",
            Self::Alert => "A",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Rain => "Rain",
            Self::Uv => "UV",
            Self::Wind => "Wind",
            Self::Usage => "Usage",
            Self::Baro => "Baro",
            Self::SwitchOn => "Switch On",
            Self::SwitchOff => "Switch Off",
            Self::Ampere1 => "Ampere 1",
            Self::Ampere2 => "Ampere 2",
            Self::Ampere3 => "Ampere 3",
            Self::TodayCounter => "Today",
            Self::Percentage => "Percentage",
            Self::DewPoint => "Dew Point",
            Self::Setpoint => "Setpoint",
            Self::Value => "Value",
            Self::LastUpdate => "Last Update",
            Self::Alert => "Alert",
        }
    }

    /// Unit label appended to rendered values, empty when the kind has none.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Temperature | Self::DewPoint | Self::Setpoint => "degrees",
            Self::Humidity | Self::Percentage => "%",
            Self::Rain => "mm",
            Self::Uv => "UVI",
            Self::Wind => "m/s",
            Self::Baro => "hPa",
            Self::Ampere1 | Self::Ampere2 | Self::Ampere3 => "Ampere",
            Self::LastUpdate => "min",
            Self::Usage
            | Self::SwitchOn
            | Self::SwitchOff
            | Self::TodayCounter
            | Self::Value
            | Self::Alert => "",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| format!("unknown notification kind tag: {s}"))
    }
}

/// Splits a packed custom message into its alert and recovery halves.
///
/// # Examples
///
/// ```
/// use devmon_common::types::split_custom_message;
///
/// assert_eq!(split_custom_message("hot;;cool"), ("hot", "cool"));
/// assert_eq!(split_custom_message("hot"), ("hot", ""));
/// ```
pub fn split_custom_message(message: &str) -> (&str, &str) {
    message
        .split_once(CUSTOM_MESSAGE_SEPARATOR)
        .unwrap_or((message, ""))
}

/// Packs alert and recovery halves; an empty recovery leaves the alert half alone.
pub fn join_custom_message(alert: &str, recovery: &str) -> String {
    if recovery.is_empty() {
        alert.to_string()
    } else {
        format!("{alert}{CUSTOM_MESSAGE_SEPARATOR}{recovery}")
    }
}

/// One persisted alert definition for a (device, kind) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: u64,
    pub device_id: u64,
    /// Only resolved for stale-update rules.
    #[serde(default)]
    pub device_name: String,
    pub active: bool,
    pub params: String,
    #[serde(default)]
    pub custom_message: String,
    #[serde(default)]
    pub custom_action: String,
    #[serde(default)]
    pub active_channels: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub send_always: bool,
    pub last_send: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
}

impl NotificationRule {
    pub fn param_fields(&self) -> Vec<&str> {
        self.params.split(';').collect()
    }

    pub fn kind(&self) -> Option<NotificationKind> {
        self.params.split(';').next().and_then(NotificationKind::from_tag)
    }

    pub fn is_kind(&self, kind: NotificationKind) -> bool {
        self.kind() == Some(kind)
    }

    /// True when params carry a fourth field equal to `1`.
    pub fn recovery_enabled(&self) -> bool {
        self.params.split(';').nth(3) == Some("1")
    }

    pub fn alert_template(&self) -> &str {
        split_custom_message(&self.custom_message).0
    }

    /// The armed recovery text, if any.
    pub fn armed_recovery(&self) -> Option<&str> {
        let (_, recovery) = split_custom_message(&self.custom_message);
        (!recovery.is_empty()).then_some(recovery)
    }

    pub fn is_armed(&self) -> bool {
        self.armed_recovery().is_some()
    }
}

/// Fields supplied when creating a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub device_id: u64,
    pub active: bool,
    pub params: String,
    #[serde(default)]
    pub custom_message: String,
    #[serde(default)]
    pub custom_action: String,
    #[serde(default)]
    pub active_channels: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub send_always: bool,
}

/// How a switch-type device presents its on/off states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchType {
    #[default]
    OnOff,
    Doorbell,
    Contact,
    DoorContact,
    DoorLock,
    DoorLockInverted,
    Motion,
    Smoke,
    Dimmer,
    Selector,
}

impl SwitchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnOff => "on_off",
            Self::Doorbell => "doorbell",
            Self::Contact => "contact",
            Self::DoorContact => "door_contact",
            Self::DoorLock => "door_lock",
            Self::DoorLockInverted => "door_lock_inverted",
            Self::Motion => "motion",
            Self::Smoke => "smoke",
            Self::Dimmer => "dimmer",
            Self::Selector => "selector",
        }
    }
}

impl std::fmt::Display for SwitchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SwitchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_off" => Ok(Self::OnOff),
            "doorbell" => Ok(Self::Doorbell),
            "contact" => Ok(Self::Contact),
            "door_contact" => Ok(Self::DoorContact),
            "door_lock" => Ok(Self::DoorLock),
            "door_lock_inverted" => Ok(Self::DoorLockInverted),
            "motion" => Ok(Self::Motion),
            "smoke" => Ok(Self::Smoke),
            "dimmer" => Ok(Self::Dimmer),
            "selector" => Ok(Self::Selector),
            _ => Err(format!("unknown switch type: {s}")),
        }
    }
}

/// Read-only device registry row consulted while evaluating rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub switch_type: SwitchType,
    #[serde(default)]
    pub custom_image: i32,
    /// `key:value` pairs joined by `;`.
    #[serde(default)]
    pub options: String,
    #[serde(default)]
    pub addj_value: f64,
    #[serde(default = "default_addj_multi")]
    pub addj_multi: f64,
    /// Unit preference flag, `1` selects imperial conversions.
    #[serde(default)]
    pub meter_type: i32,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

fn default_addj_multi() -> f64 {
    1.0
}

impl DeviceInfo {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .split(';')
            .filter_map(|pair| pair.split_once(':'))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Selector level names, indexed by `level / 10`.
    pub fn level_names(&self) -> Vec<&str> {
        self.option("LevelNames")
            .map(|names| names.split('|').collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfxSensorKind {
    Temp,
    Ad,
    Volt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RainKind {
    /// Cumulative total, alerts on the daily delta.
    Counter,
    /// Payload already is a rate.
    Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvKind {
    Uv1,
    Uv2,
    /// Carries a temperature as second field.
    Uv3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneralKind {
    Visibility,
    Distance,
    Baro,
    Kwh,
    Percentage,
    SoilMoisture,
    LeafWetness,
    Fan,
    SoundLevel,
    SolarRadiation,
    Voltage,
    Current,
    Pressure,
    Waterflow,
    Custom,
    Alert,
    Other,
}

/// Raw device type and subtype of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "subtype", rename_all = "snake_case")]
pub enum DeviceType {
    P1Power,
    P1Gas,
    RfxSensor(RfxSensorKind),
    Setpoint,
    Temp,
    Hum,
    TempHum,
    TempHumBaro,
    TempBaro,
    Rain(RainKind),
    Uv(UvKind),
    Current,
    CurrentEnergy,
    Wind,
    YouLess,
    AirQuality,
    Weight,
    Lux,
    Rego6xxTemp,
    Power,
    RfxMeter,
    Usage,
    Evohome,
    General(GeneralKind),
    Light,
    #[serde(other)]
    Unsupported,
}

/// One raw reading as delivered by the device subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub row_id: Option<u64>,
    #[serde(default)]
    pub hardware_id: i64,
    #[serde(default)]
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub unit: u8,
    pub device: DeviceType,
    #[serde(default)]
    pub n_value: i64,
    #[serde(default)]
    pub s_value: String,
    #[serde(default)]
    pub f_value: f64,
}

impl DeviceReport {
    /// Semicolon-split composite payload fields.
    ///
    /// An empty payload has no fields and a single trailing separator does
    /// not open an extra empty field.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.s_value.split(';').collect();
        if fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }
        fields
    }
}

/// Lenient float parse: leading numeric prefix, `0.0` otherwise.
///
/// # Examples
///
/// ```
/// use devmon_common::types::parse_lenient_f64;
///
/// assert_eq!(parse_lenient_f64(" 21.5"), 21.5);
/// assert_eq!(parse_lenient_f64("12.0mm"), 12.0);
/// assert_eq!(parse_lenient_f64("1e3"), 1000.0);
/// assert_eq!(parse_lenient_f64("n/a"), 0.0);
/// ```
pub fn parse_lenient_f64(s: &str) -> f64 {
    let s = s.trim();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'-' | b'+')));
    end = digits_from(end);
    if bytes.get(end) == Some(&b'.') {
        end = digits_from(end + 1);
    }
    // Exponent only counts when at least one digit follows it.
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'-' | b'+')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    s[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(params: &str, message: &str) -> NotificationRule {
        NotificationRule {
            id: 1,
            device_id: 7,
            device_name: String::new(),
            active: true,
            params: params.into(),
            custom_message: message.into(),
            custom_action: String::new(),
            active_channels: vec![],
            priority: 0,
            send_always: false,
            last_send: None,
            last_update: None,
        }
    }

    fn report(s_value: &str) -> DeviceReport {
        DeviceReport {
            row_id: Some(1),
            hardware_id: 0,
            external_id: String::new(),
            name: "meter".into(),
            unit: 0,
            device: DeviceType::Power,
            n_value: 0,
            s_value: s_value.into(),
            f_value: 0.0,
        }
    }

    #[test]
    fn report_fields_drop_empty_tail() {
        assert!(report("").fields().is_empty());
        assert_eq!(report("1;2;").fields(), vec!["1", "2"]);
        assert_eq!(report("1;;2").fields(), vec!["1", "", "2"]);
        assert_eq!(report("1;2;;").fields(), vec!["1", "2", ""]);
    }

    #[test]
    fn lenient_parse_prefixes() {
        assert_eq!(parse_lenient_f64("1e3"), 1000.0);
        assert_eq!(parse_lenient_f64("2.5E-1kW"), 0.25);
        assert_eq!(parse_lenient_f64("4e"), 4.0);
        assert_eq!(parse_lenient_f64("7e+x"), 7.0);
        assert_eq!(parse_lenient_f64(".5"), 0.5);
        assert_eq!(parse_lenient_f64("-3.5 C"), -3.5);
        assert_eq!(parse_lenient_f64("-"), 0.0);
        assert_eq!(parse_lenient_f64(""), 0.0);
    }

    #[test]
    fn kind_tags_are_unique() {
        for kind in NotificationKind::ALL {
            assert_eq!(NotificationKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(NotificationKind::from_tag("Z"), None);
    }

    #[test]
    fn rule_recovery_and_armed_state() {
        let r = rule("T;>;30;1", "hot $value");
        assert_eq!(r.kind(), Some(NotificationKind::Temperature));
        assert!(r.recovery_enabled());
        assert!(!r.is_armed());
        assert_eq!(r.alert_template(), "hot $value");

        let armed = rule("T;>;30;1", "hot;;[Recovered] hot");
        assert_eq!(armed.armed_recovery(), Some("[Recovered] hot"));
        assert_eq!(armed.alert_template(), "hot");

        assert!(!rule("T;>;30;0", "").recovery_enabled());
        assert!(!rule("S", "").recovery_enabled());
    }

    #[test]
    fn join_custom_message_omits_empty_recovery() {
        assert_eq!(join_custom_message("a", ""), "a");
        assert_eq!(join_custom_message("a", "b"), "a;;b");
        assert_eq!(join_custom_message("", "b"), ";;b");
    }

    #[test]
    fn device_options_level_names() {
        let info = DeviceInfo {
            id: 3,
            name: "Scene".into(),
            switch_type: SwitchType::Selector,
            custom_image: 0,
            options: "LevelActions:|;LevelNames:Off|Low|High".into(),
            addj_value: 0.0,
            addj_multi: 1.0,
            meter_type: 0,
            last_update: None,
        };
        assert_eq!(info.level_names(), vec!["Off", "Low", "High"]);
        assert_eq!(info.option("Missing"), None);
    }

    #[test]
    fn device_type_json_shape() {
        let t: DeviceType =
            serde_json::from_str(r#"{"type":"rain","subtype":"counter"}"#).unwrap();
        assert_eq!(t, DeviceType::Rain(RainKind::Counter));
        let t: DeviceType = serde_json::from_str(r#"{"type":"temp_hum"}"#).unwrap();
        assert_eq!(t, DeviceType::TempHum);
        let t: DeviceType = serde_json::from_str(r#"{"type":"thermostat"}"#).unwrap();
        assert_eq!(t, DeviceType::Unsupported);
    }
}
