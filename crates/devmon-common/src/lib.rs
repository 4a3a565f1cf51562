//! Types shared by the devmon crates: notification rules, canonical alert
//! kinds and raw device reports.

pub mod types;
