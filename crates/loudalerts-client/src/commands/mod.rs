//! Subcommand implementations.

pub mod config;
pub mod run;
pub mod snooze;
pub mod test_alert;
