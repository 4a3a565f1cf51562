//! Rule evaluation for device readings.
//!
//! Raw reports are mapped by the [`normalizer`] onto canonical checks, which
//! the [`engine::NotificationEngine`] evaluates against the cached rules of
//! the device. Threshold rules alert once per breach and send a paired
//! recovery message when the reading returns to normal. The
//! [`watchdog::StaleDeviceWatchdog`] alerts on devices that stopped reporting.

pub mod cache;
pub mod compare;
pub mod engine;
pub mod normalizer;
pub mod watchdog;
