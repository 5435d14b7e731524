//! The single decision this program makes: should Low Power Mode go on now?

use crate::config::{SaverConfig, Threshold};
use crate::pmset::{BatteryReading, PowerMode};

impl Threshold {
    /// `level <= threshold`. In minutes mode a reading without an estimate
    /// never crosses.
    pub fn is_crossed(&self, reading: &BatteryReading) -> bool {
        match *self {
            Threshold::Percent(p) => reading.percent <= p,
            Threshold::Minutes(m) => reading.minutes_remaining().is_some_and(|left| left <= m),
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Automatic switching is turned off.
    Disabled,
    /// Plugged in; nothing to save.
    OnAc,
    AboveThreshold,
    /// At or below threshold but Low Power Mode is already on.
    AlreadyLow,
    /// Switch Low Power Mode on.
    Engage,
}

/// Tracks whether the user has already been told about the current
/// crossing, so a battery that hovers at the threshold produces one
/// notification rather than one per tick.
#[derive(Debug, Default)]
pub struct Governor {
    notified: bool,
}

impl Governor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &mut self,
        config: &SaverConfig,
        reading: &BatteryReading,
        mode: PowerMode,
    ) -> Verdict {
        if !config.enabled {
            return Verdict::Disabled;
        }
        if !reading.on_battery() {
            self.notified = false;
            return Verdict::OnAc;
        }
        if !config.active_threshold().is_crossed(reading) {
            self.notified = false;
            return Verdict::AboveThreshold;
        }
        if mode.is_low() {
            Verdict::AlreadyLow
        } else {
            Verdict::Engage
        }
    }

    /// Record a successful switch. Returns true when a notification is due.
    pub fn engaged(&mut self) -> bool {
        !std::mem::replace(&mut self.notified, true)
    }
}
