use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, SaverError};

pub const MIN_THRESHOLD: u8 = 5;
pub const MAX_THRESHOLD: u8 = 95;
pub const MIN_CHECK_INTERVAL: u64 = 5;

/// Minutes offered by the time-remaining threshold menu.
pub const TIME_THRESHOLD_CHOICES: [u32; 8] = [60, 90, 120, 150, 180, 210, 240, 300];

/// What the threshold is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    #[default]
    Percentage,
    Time,
}

impl ThresholdMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Percentage => Self::Time,
            Self::Time => Self::Percentage,
        }
    }
}

/// Menu-bar glyph set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconStyle {
    /// 💤 🔌 🪫 ⚡ 🔋
    #[default]
    Full,
    /// ⚡ while monitoring, 🍃 with Low Power Mode on.
    Minimal,
}

/// The persisted settings record. Missing keys take their defaults and
/// unknown keys are ignored, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaverConfig {
    pub threshold: u8,
    pub enabled: bool,
    pub notifications: bool,
    /// Seconds between battery checks.
    pub check_interval: u64,
    pub threshold_mode: ThresholdMode,
    pub time_threshold_minutes: u32,
    pub smart_auto_enabled: bool,
    /// Passwordless sudo for pmset has been installed.
    pub setup_complete: bool,
    pub show_percentage: bool,
    pub icon_style: IconStyle,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            enabled: true,
            notifications: true,
            check_interval: 30,
            threshold_mode: ThresholdMode::Percentage,
            time_threshold_minutes: 90,
            smart_auto_enabled: false,
            setup_complete: false,
            show_percentage: false,
            icon_style: IconStyle::Full,
        }
    }
}

/// The trigger point derived from the active threshold mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Percent(u8),
    Minutes(u32),
}

impl SaverConfig {
    pub fn active_threshold(&self) -> Threshold {
        match self.threshold_mode {
            ThresholdMode::Percentage => Threshold::Percent(self.threshold),
            ThresholdMode::Time => Threshold::Minutes(self.time_threshold_minutes),
        }
    }

    pub fn set_threshold(&mut self, percent: u8) -> Result<()> {
        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&percent) {
            return Err(SaverError::InvalidThreshold(percent));
        }
        self.threshold = percent;
        Ok(())
    }

    /// Pull hand-edited values back into range.
    pub fn normalized(mut self) -> Self {
        let clamped = self.threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD);
        if clamped != self.threshold {
            warn!(threshold = self.threshold, clamped, "threshold out of range");
            self.threshold = clamped;
        }
        if self.check_interval < MIN_CHECK_INTERVAL {
            warn!(check_interval = self.check_interval, "check interval too short");
            self.check_interval = MIN_CHECK_INTERVAL;
        }
        if self.time_threshold_minutes == 0 {
            self.time_threshold_minutes = Self::default().time_threshold_minutes;
        }
        self
    }

    pub fn check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.check_interval.max(MIN_CHECK_INTERVAL))
    }
}

/// Location of the JSON settings file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Find the config file.
    /// Search order:
    ///   1. BATTERY_SAVER_CONFIG env var
    ///   2. ~/.battery_saver_config.json
    ///   3. ./.battery_saver_config.json (no home directory)
    pub fn resolve() -> Self {
        let path = std::env::var("BATTERY_SAVER_CONFIG")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".battery_saver_config.json")))
            .unwrap_or_else(|| PathBuf::from(".battery_saver_config.json"));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// cannot be parsed.
    pub fn load(&self) -> SaverConfig {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no config file, using defaults");
            return SaverConfig::default();
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<SaverConfig>(&content) {
                Ok(config) => {
                    debug!(
                        path = %self.path.display(),
                        threshold = config.threshold,
                        enabled = config.enabled,
                        "loaded config"
                    );
                    config.normalized()
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "failed to parse config");
                    SaverConfig::default()
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read config");
                SaverConfig::default()
            }
        }
    }

    pub fn save(&self, config: &SaverConfig) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, json)?;
        info!(path = %self.path.display(), "saved config");
        Ok(())
    }

    /// Load, apply `f`, save. Returns the saved config.
    pub fn update<F>(&self, f: F) -> Result<SaverConfig>
    where
        F: FnOnce(&mut SaverConfig) -> Result<()>,
    {
        let mut config = self.load();
        f(&mut config)?;
        self.save(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (_dir, store) = store();
        let config = store.load();
        assert_eq!(config, SaverConfig::default());
        assert_eq!(config.threshold, 20);
        assert!(config.enabled);
        assert_eq!(config.check_interval, 30);
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let (_dir, store) = store();
        fs::write(store.path(), r#"{"threshold": 35, "enabled": false, "legacy": 1}"#).unwrap();
        let config = store.load();
        assert_eq!(config.threshold, 35);
        assert!(!config.enabled);
        assert!(config.notifications);
        assert_eq!(config.threshold_mode, ThresholdMode::Percentage);
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let (_dir, store) = store();
        fs::write(store.path(), "{not json").unwrap();
        assert_eq!(store.load(), SaverConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = store();
        let mut config = SaverConfig::default();
        config.threshold_mode = ThresholdMode::Time;
        config.time_threshold_minutes = 120;
        config.icon_style = IconStyle::Minimal;
        store.save(&config).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"threshold_mode\": \"time\""));
        assert_eq!(store.load(), config);
    }

    #[test]
    fn test_set_threshold_bounds() {
        let mut config = SaverConfig::default();
        assert!(config.set_threshold(5).is_ok());
        assert!(config.set_threshold(95).is_ok());
        assert!(matches!(config.set_threshold(4), Err(SaverError::InvalidThreshold(4))));
        assert!(matches!(config.set_threshold(96), Err(SaverError::InvalidThreshold(96))));
        assert_eq!(config.threshold, 95);
    }

    #[test]
    fn test_out_of_range_values_are_clamped_on_load() {
        let (_dir, store) = store();
        fs::write(store.path(), r#"{"threshold": 1, "check_interval": 0}"#).unwrap();
        let config = store.load();
        assert_eq!(config.threshold, MIN_THRESHOLD);
        assert_eq!(config.check_interval, MIN_CHECK_INTERVAL);
    }

    #[test]
    fn test_update_persists() {
        let (_dir, store) = store();
        let saved = store
            .update(|c| {
                c.enabled = false;
                c.set_threshold(40)
            })
            .unwrap();
        assert_eq!(saved.threshold, 40);
        assert_eq!(store.load().threshold, 40);
        assert!(!store.load().enabled);
    }

    #[test]
    fn test_update_error_does_not_write() {
        let (_dir, store) = store();
        assert!(store.update(|c| c.set_threshold(99)).is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_active_threshold_follows_mode() {
        let mut config = SaverConfig::default();
        assert_eq!(config.active_threshold(), Threshold::Percent(20));
        config.threshold_mode = config.threshold_mode.toggled();
        assert_eq!(config.active_threshold(), Threshold::Minutes(90));
    }
}
