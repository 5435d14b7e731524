//! The periodic check shared by the daemon and the tray app.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, SaverConfig, ThresholdMode, MAX_THRESHOLD, MIN_THRESHOLD};
use crate::display::{self, APP_NAME};
use crate::error::Result;
use crate::governor::{Governor, Verdict};
use crate::health::read_health;
use crate::history::{BatteryHistory, HistoryStore, Sample};
use crate::notify::Notifier;
use crate::pmset::{BatteryReading, Elevation, Escalation, Pmset, PowerMode};
use crate::setup;
use crate::shell::Shell;

/// What a tick did about Low Power Mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Switched(Elevation),
    Failed(String),
}

/// Everything the presentation layer needs after one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub config: SaverConfig,
    pub reading: Option<BatteryReading>,
    pub mode: Option<PowerMode>,
    pub verdict: Option<Verdict>,
    pub outcome: Outcome,
}

pub struct Monitor<S, N> {
    pmset: Pmset<S>,
    notifier: N,
    config: ConfigStore,
    history: Option<HistoryStore>,
    governor: Governor,
    escalation: Escalation,
}

impl<S: Shell, N: Notifier> Monitor<S, N> {
    pub fn new(shell: S, notifier: N, config: ConfigStore, escalation: Escalation) -> Self {
        Self {
            pmset: Pmset::new(shell),
            notifier,
            config,
            history: None,
            governor: Governor::new(),
            escalation,
        }
    }

    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn history(&self) -> Option<&BatteryHistory> {
        self.history.as_ref().map(HistoryStore::history)
    }

    /// Write any unsaved samples, e.g. before shutting down.
    pub fn save_history(&self) -> Result<()> {
        match &self.history {
            Some(store) => store.save(),
            None => Ok(()),
        }
    }

    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Utc::now())
    }

    pub fn tick_at(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut config = self.config.load();

        let reading = match self.pmset.battery() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to read battery");
                return TickReport {
                    config,
                    reading: None,
                    mode: None,
                    verdict: None,
                    outcome: Outcome::Unchanged,
                };
            }
        };

        let mode = match self.pmset.current_mode(reading.source) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "failed to read power mode");
                None
            }
        };

        if let Some(store) = self.history.as_mut() {
            let sample = Sample::from_reading(&reading, mode.unwrap_or_default(), now);
            if let Err(e) = store.record(sample) {
                warn!(path = %store.path().display(), error = %e, "failed to save history");
            }
        }

        self.apply_smart_threshold(&mut config);

        let verdict = self
            .governor
            .evaluate(&config, &reading, mode.unwrap_or_default());
        debug!(
            level = reading.percent,
            source = reading.source.label(),
            ?verdict,
            "tick"
        );

        let outcome = if verdict == Verdict::Engage {
            self.engage(&config, &reading)
        } else {
            Outcome::Unchanged
        };

        let mode = match outcome {
            Outcome::Switched(_) => Some(PowerMode::Low),
            _ => mode,
        };

        TickReport {
            config,
            reading: Some(reading),
            mode,
            verdict: Some(verdict),
            outcome,
        }
    }

    /// Read battery and mode for display only. Nothing is switched or
    /// recorded.
    pub fn snapshot(&self) -> TickReport {
        let config = self.config.load();
        let reading = match self.pmset.battery() {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "failed to read battery");
                None
            }
        };
        let mode = reading
            .as_ref()
            .and_then(|r| match self.pmset.current_mode(r.source) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!(error = %e, "failed to read power mode");
                    None
                }
            });
        TickReport {
            config,
            reading,
            mode,
            verdict: None,
            outcome: Outcome::Unchanged,
        }
    }

    fn apply_smart_threshold(&self, config: &mut SaverConfig) {
        if config.threshold_mode != ThresholdMode::Percentage || !config.smart_auto_enabled {
            return;
        }
        let Some(suggested) = self.history().and_then(BatteryHistory::smart_threshold) else {
            return;
        };
        let suggested = suggested.clamp(MIN_THRESHOLD, MAX_THRESHOLD);
        if suggested == config.threshold {
            return;
        }

        info!(from = config.threshold, to = suggested, "smart threshold adjusted");
        config.threshold = suggested;
        if let Err(e) = self.config.save(config) {
            warn!(error = %e, "failed to save smart threshold");
        }
    }

    fn engage(&mut self, config: &SaverConfig, reading: &BatteryReading) -> Outcome {
        match self.pmset.set_low_power(true, self.escalation) {
            Ok(how) => {
                info!(
                    level = reading.percent,
                    threshold = %display::threshold_phrase(config),
                    "low power mode enabled"
                );
                if self.governor.engaged() && config.notifications {
                    let body = match reading.estimate_text() {
                        Some(left) if config.threshold_mode == ThresholdMode::Time => format!(
                            "Battery at {}% ({left}). Low Power Mode enabled.",
                            reading.percent
                        ),
                        _ => format!("Battery at {}%. Low Power Mode enabled.", reading.percent),
                    };
                    self.notifier.notify(APP_NAME, None, &body);
                }
                Outcome::Switched(how)
            }
            Err(e) => {
                warn!(error = %e, "failed to enable low power mode");
                if self.governor.engaged() && config.notifications {
                    self.notifier.notify(
                        APP_NAME,
                        Some("Could not enable Low Power Mode"),
                        "Run Set Up Passwordless Access to allow automatic switching.",
                    );
                }
                Outcome::Failed(e.to_string())
            }
        }
    }

    /// Manual switch from a menu item or the CLI.
    pub fn set_low_power(&self, enabled: bool) -> Result<Elevation> {
        self.pmset.set_low_power(enabled, self.escalation)
    }

    pub fn battery_info(&self) -> Result<String> {
        let config = self.config.load();
        let reading = self.pmset.battery()?;
        let health = read_health(self.pmset.shell()).unwrap_or_else(|e| {
            debug!(error = %e, "battery health unavailable");
            None
        });
        let suggestion = self.history().and_then(BatteryHistory::smart_threshold);
        Ok(display::battery_info(&config, &reading, health.as_ref(), suggestion))
    }

    pub fn power_mode_info(&self) -> Result<String> {
        let reading = self.pmset.battery()?;
        let mode = self.pmset.current_mode(reading.source)?;
        Ok(format!(
            "Current Power Mode: {}\nPower Source: {}",
            mode.name(),
            reading.source.label()
        ))
    }

    pub fn analytics_report(&self) -> String {
        self.analytics_report_at(Utc::now())
    }

    pub fn analytics_report_at(&self, now: DateTime<Utc>) -> String {
        let config = self.config.load();
        let empty = BatteryHistory::new();
        let history = self.history().unwrap_or(&empty);
        display::analytics_report(
            &config,
            history,
            history.longevity_score(now),
            history.health_trend(now).as_ref(),
            history.smart_threshold(),
        )
    }

    /// Install the sudoers rule and remember that setup ran.
    pub fn run_setup(&self) -> Result<()> {
        setup::install_passwordless_pmset(self.pmset.shell())?;
        self.config.update(|c| {
            c.setup_complete = true;
            Ok(())
        })?;
        Ok(())
    }
}
