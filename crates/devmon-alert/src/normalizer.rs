//! Maps raw device reports onto the canonical checks the engine evaluates.

use devmon_common::types::{
    parse_lenient_f64, DeviceInfo, DeviceReport, DeviceType, GeneralKind, NotificationKind,
    RainKind, RfxSensorKind, UvKind,
};

const MILES_PER_KM: f64 = 0.6214;
const INCHES_PER_CM: f64 = 0.3937007874015748;

/// One evaluation request derived from a device report.
#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    TempHumidity {
        temp: Option<f64>,
        humidity: Option<i32>,
    },
    DewPoint {
        temp: f64,
        dew_point: f64,
    },
    Threshold {
        kind: NotificationKind,
        value: f64,
    },
    /// `rate` payloads are used as is, counters alert on today's delta.
    Rain {
        value: f64,
        rate: bool,
    },
    Ampere([f64; 3]),
    AlertText(String),
}

/// Dew point in degrees Celsius (Magnus formula).
pub fn dew_point(temp: f64, humidity: i32) -> f64 {
    if humidity == 0 {
        return temp;
    }
    let gamma = (f64::from(humidity) / 100.0).ln() + 17.625 * temp / (243.04 + temp);
    243.04 * gamma / (17.625 - gamma)
}

fn threshold(kind: NotificationKind, value: f64) -> Vec<Check> {
    vec![Check::Threshold { kind, value }]
}

fn usage(value: f64) -> Vec<Check> {
    threshold(NotificationKind::Usage, value)
}

fn temp_only(temp: f64) -> Check {
    Check::TempHumidity {
        temp: Some(temp),
        humidity: None,
    }
}

fn field(fields: &[&str], index: usize) -> f64 {
    fields.get(index).map_or(0.0, |f| parse_lenient_f64(f))
}

fn temp_hum(fields: &[&str]) -> Vec<Check> {
    let temp = field(fields, 0);
    let humidity = field(fields, 1) as i32;
    vec![
        Check::TempHumidity {
            temp: Some(temp),
            humidity: Some(humidity),
        },
        Check::DewPoint {
            temp,
            dew_point: dew_point(temp, humidity),
        },
    ]
}

/// Translates a report into zero or more checks.
///
/// Reports without a row id and switch-type devices produce nothing; those
/// are driven through the switch entry points of the engine instead.
pub fn normalize(report: &DeviceReport, device: Option<&DeviceInfo>) -> Vec<Check> {
    if report.row_id.is_none() {
        return Vec::new();
    }

    let fields = report.fields();
    let f = report.f_value;
    let n = report.n_value;

    let (expected, checks) = match report.device {
        DeviceType::P1Power => (5, (fields.len() >= 5).then(|| usage(field(&fields, 4)))),
        DeviceType::RfxSensor(RfxSensorKind::Temp) | DeviceType::Temp => {
            (0, Some(vec![temp_only(f)]))
        }
        DeviceType::RfxSensor(RfxSensorKind::Ad | RfxSensorKind::Volt) => (0, Some(usage(f))),
        DeviceType::Setpoint => (0, Some(threshold(NotificationKind::Setpoint, f))),
        DeviceType::Hum => (
            0,
            Some(vec![Check::TempHumidity {
                temp: None,
                humidity: Some(n as i32),
            }]),
        ),
        DeviceType::TempHum => (2, (fields.len() >= 2).then(|| temp_hum(&fields))),
        DeviceType::TempHumBaro => (
            4,
            (fields.len() >= 4).then(|| {
                let mut checks = temp_hum(&fields);
                checks.push(Check::Threshold {
                    kind: NotificationKind::Baro,
                    value: field(&fields, 3),
                });
                checks
            }),
        ),
        DeviceType::Rain(kind) => (
            2,
            (fields.len() >= 2).then(|| {
                vec![Check::Rain {
                    value: field(&fields, 1),
                    rate: kind == RainKind::Rate,
                }]
            }),
        ),
        DeviceType::TempBaro => (
            2,
            (fields.len() >= 2).then(|| {
                vec![
                    temp_only(field(&fields, 0)),
                    Check::Threshold {
                        kind: NotificationKind::Baro,
                        value: field(&fields, 1),
                    },
                ]
            }),
        ),
        DeviceType::Uv(kind) => (
            2,
            (fields.len() >= 2).then(|| {
                let mut checks = Vec::with_capacity(2);
                if kind == UvKind::Uv3 {
                    checks.push(temp_only(field(&fields, 1)));
                }
                checks.push(Check::Threshold {
                    kind: NotificationKind::Uv,
                    value: field(&fields, 0),
                });
                checks
            }),
        ),
        DeviceType::Current | DeviceType::CurrentEnergy => (
            3,
            (fields.len() >= 3).then(|| {
                vec![Check::Ampere([
                    field(&fields, 0),
                    field(&fields, 1),
                    field(&fields, 2),
                ])]
            }),
        ),
        DeviceType::Wind => (
            5,
            (fields.len() >= 5).then(|| {
                vec![
                    Check::Threshold {
                        kind: NotificationKind::Wind,
                        value: field(&fields, 2) / 10.0,
                    },
                    temp_only(field(&fields, 4)),
                ]
            }),
        ),
        DeviceType::YouLess => (2, (fields.len() >= 2).then(|| usage(field(&fields, 1)))),
        DeviceType::AirQuality => (0, Some(usage(n as f64))),
        DeviceType::Weight | DeviceType::Lux | DeviceType::Usage => (0, Some(usage(f))),
        DeviceType::Rego6xxTemp => (0, Some(threshold(NotificationKind::Temperature, f))),
        DeviceType::Power => (1, (!fields.is_empty()).then(|| usage(field(&fields, 0)))),
        DeviceType::RfxMeter => (0, Some(threshold(NotificationKind::TodayCounter, f))),
        DeviceType::General(kind) => match kind {
            GeneralKind::Visibility => (0, Some(usage(imperial(f, device, MILES_PER_KM)))),
            GeneralKind::Distance => (0, Some(usage(imperial(f, device, INCHES_PER_CM)))),
            GeneralKind::Baro | GeneralKind::Kwh => {
                (1, (!fields.is_empty()).then(|| usage(field(&fields, 0))))
            }
            GeneralKind::Percentage => (0, Some(threshold(NotificationKind::Percentage, f))),
            GeneralKind::SoilMoisture | GeneralKind::LeafWetness => (0, Some(usage(n as f64))),
            GeneralKind::Fan
            | GeneralKind::SoundLevel
            | GeneralKind::SolarRadiation
            | GeneralKind::Voltage
            | GeneralKind::Current
            | GeneralKind::Pressure
            | GeneralKind::Waterflow
            | GeneralKind::Custom => (0, Some(usage(f))),
            GeneralKind::Alert => (0, Some(vec![Check::AlertText(report.s_value.clone())])),
            GeneralKind::Other => (0, Some(Vec::new())),
        },
        DeviceType::P1Gas | DeviceType::Evohome | DeviceType::Light => (0, Some(Vec::new())),
        DeviceType::Unsupported => (0, None),
    };

    match checks {
        Some(checks) => checks,
        None if expected > 0 => {
            tracing::warn!(
                hardware_id = report.hardware_id,
                external_id = %report.external_id,
                unit = report.unit,
                device = ?report.device,
                expected,
                received = fields.len(),
                s_value = %report.s_value,
                "Too few payload fields, notification not checked"
            );
            Vec::new()
        }
        None => {
            tracing::warn!(
                hardware_id = report.hardware_id,
                external_id = %report.external_id,
                unit = report.unit,
                device = ?report.device,
                "Device report not handled by notifications"
            );
            Vec::new()
        }
    }
}

fn imperial(value: f64, device: Option<&DeviceInfo>, factor: f64) -> f64 {
    if device.is_some_and(|d| d.meter_type == 1) {
        value * factor
    } else {
        value
    }
}
