//! Automatic Low Power Mode for macOS laptops.
//!
//! Reads the battery with `pmset -g batt`, compares it to a configured
//! threshold and switches Low Power Mode on with `pmset -b lowpowermode 1`.
//! Shared by the `battery-saver` daemon and the menu-bar app.

pub mod config;
pub mod display;
pub mod error;
pub mod governor;
pub mod health;
pub mod history;
pub mod monitor;
pub mod notify;
pub mod pmset;
pub mod setup;
pub mod shell;

pub use config::{ConfigStore, SaverConfig, Threshold, ThresholdMode};
pub use error::{Result, SaverError};
pub use monitor::{Monitor, Outcome, TickReport};
pub use notify::{Notifier, OsaNotifier};
pub use pmset::{BatteryReading, Escalation, Pmset, PowerMode};
pub use shell::{Shell, SystemShell};
