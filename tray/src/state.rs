use battery_saver_core::config::{
    SaverConfig, ThresholdMode, MAX_THRESHOLD, MIN_THRESHOLD, TIME_THRESHOLD_CHOICES,
};
use battery_saver_core::display;
use battery_saver_core::{BatteryReading, Outcome, PowerMode, TickReport};

/// A value offered in the threshold submenu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdChoice {
    Percent(u8),
    Minutes(u32),
}

pub struct ThresholdOption {
    pub label: String,
    pub choice: ThresholdChoice,
    pub checked: bool,
}

/// Submenu entries for the current threshold mode.
pub fn threshold_options(config: &SaverConfig) -> Vec<ThresholdOption> {
    match config.threshold_mode {
        ThresholdMode::Percentage => (MIN_THRESHOLD..=MAX_THRESHOLD)
            .step_by(5)
            .map(|p| ThresholdOption {
                label: format!("{p}%"),
                choice: ThresholdChoice::Percent(p),
                checked: p == config.threshold,
            })
            .collect(),
        ThresholdMode::Time => TIME_THRESHOLD_CHOICES
            .iter()
            .map(|&m| ThresholdOption {
                label: format!("{m} minutes"),
                choice: ThresholdChoice::Minutes(m),
                checked: m == config.time_threshold_minutes,
            })
            .collect(),
    }
}

/// What the menu bar shows, rebuilt from each tick report.
pub struct TrayState {
    pub config: SaverConfig,
    pub reading: Option<BatteryReading>,
    pub mode: Option<PowerMode>,
    pub last_error: Option<String>,
}

impl TrayState {
    pub fn new(config: SaverConfig) -> Self {
        Self {
            config,
            reading: None,
            mode: None,
            last_error: None,
        }
    }

    /// Take in a report. Returns true when the threshold submenu needs
    /// rebuilding because the mode changed.
    pub fn apply(&mut self, report: TickReport) -> bool {
        let mode_changed = report.config.threshold_mode != self.config.threshold_mode;
        self.config = report.config;
        self.reading = report.reading;
        self.mode = report.mode;
        match report.outcome {
            Outcome::Failed(reason) => self.last_error = Some(reason),
            Outcome::Switched(_) => self.last_error = None,
            Outcome::Unchanged => {}
        }
        mode_changed
    }

    pub fn title(&self) -> String {
        display::status_glyph(&self.config, self.reading.as_ref(), self.mode)
    }

    pub fn status_text(&self) -> String {
        match &self.reading {
            Some(r) => match r.estimate_text() {
                Some(left) => format!("Battery: {}% ({left})", r.percent),
                None => format!("Battery: {}%", r.percent),
            },
            None => "Battery: unavailable".into(),
        }
    }

    pub fn tooltip(&self) -> String {
        let mut tip = String::from(display::APP_NAME);
        if let Some(r) = &self.reading {
            tip.push_str(&format!("\n{}% on {}", r.percent, r.source.label()));
        }
        if let Some(mode) = self.mode {
            tip.push_str(&format!(" \u{00B7} {}", mode.name()));
        }
        if !self.config.enabled {
            tip.push_str("\nMonitoring paused");
        }
        if let Some(e) = &self.last_error {
            tip.push_str(&format!("\n\u{26A0} {e}"));
        }
        tip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use battery_saver_core::governor::Verdict;
    use battery_saver_core::pmset::{ChargeState, Elevation, Estimate, PowerSource};

    fn report(config: SaverConfig, outcome: Outcome) -> TickReport {
        TickReport {
            config,
            reading: Some(BatteryReading {
                percent: 18,
                source: PowerSource::Battery,
                state: ChargeState::Discharging,
                estimate: Estimate::Remaining(72),
            }),
            mode: Some(PowerMode::Low),
            verdict: Some(Verdict::Engage),
            outcome,
        }
    }

    #[test]
    fn test_percent_options_cover_range_and_check_current() {
        let opts = threshold_options(&SaverConfig::default());
        assert_eq!(opts.len(), 19);
        assert_eq!(opts.first().map(|o| o.label.as_str()), Some("5%"));
        assert_eq!(opts.last().map(|o| o.choice), Some(ThresholdChoice::Percent(95)));
        let checked: Vec<_> = opts.iter().filter(|o| o.checked).map(|o| o.choice).collect();
        assert_eq!(checked, vec![ThresholdChoice::Percent(20)]);
    }

    #[test]
    fn test_time_options() {
        let config = SaverConfig {
            threshold_mode: ThresholdMode::Time,
            time_threshold_minutes: 120,
            ..SaverConfig::default()
        };
        let opts = threshold_options(&config);
        assert_eq!(opts.len(), TIME_THRESHOLD_CHOICES.len());
        assert!(opts.iter().any(|o| o.checked && o.label == "120 minutes"));
    }

    #[test]
    fn test_apply_flags_mode_change() {
        let mut state = TrayState::new(SaverConfig::default());
        assert!(!state.apply(report(SaverConfig::default(), Outcome::Unchanged)));
        let time = SaverConfig {
            threshold_mode: ThresholdMode::Time,
            ..SaverConfig::default()
        };
        assert!(state.apply(report(time, Outcome::Unchanged)));
    }

    #[test]
    fn test_texts_follow_report() {
        let mut state = TrayState::new(SaverConfig::default());
        assert_eq!(state.status_text(), "Battery: unavailable");

        state.apply(report(SaverConfig::default(), Outcome::Failed("no sudo".into())));
        assert_eq!(state.title(), "\u{1F4A4}");
        assert_eq!(state.status_text(), "Battery: 18% (1:12)");
        assert!(state.tooltip().contains("18% on Battery \u{00B7} Low Power Mode"));
        assert!(state.tooltip().ends_with("no sudo"));

        state.apply(report(SaverConfig::default(), Outcome::Switched(Elevation::Sudo)));
        assert!(state.last_error.is_none());
    }
}
