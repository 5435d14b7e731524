//! Battery history and the analytics computed over it: charge cycle
//! counting, a longevity score, a smart threshold suggestion and a
//! discharge-time trend.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::pmset::{BatteryReading, PowerMode};

/// Oldest samples are dropped past this many.
pub const MAX_SAMPLES: usize = 1000;

/// One observation, recorded every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub battery_level: u8,
    /// `PowerMode::code()`: 0 automatic, 1 low, 2 high.
    pub power_mode: u8,
    pub on_battery: bool,
    pub time_remaining_minutes: Option<u32>,
}

impl Sample {
    pub fn from_reading(reading: &BatteryReading, mode: PowerMode, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            battery_level: reading.percent,
            power_mode: mode.code(),
            on_battery: reading.on_battery(),
            time_remaining_minutes: reading.minutes_remaining(),
        }
    }

    fn is_low_power(&self) -> bool {
        self.power_mode == PowerMode::Low.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => Self::Excellent,
            s if s >= 75.0 => Self::Good,
            s if s >= 60.0 => Self::Fair,
            s if s >= 40.0 => Self::Poor,
            _ => Self::Critical,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendKind {
    Excellent,
    Good,
    Fair,
    Poor,
    FrequentLpm,
}

impl TrendKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::FrequentLpm => "Frequent LPM",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Excellent => "Battery performing excellently (5+ hours discharge time)",
            Self::Good => "Battery performing well (4+ hours discharge time)",
            Self::Fair => "Battery performance acceptable (3+ hours discharge time)",
            Self::Poor => "Battery needs attention (less than 3 hours discharge time)",
            Self::FrequentLpm => "Frequent Low Power Mode usage detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthTrend {
    pub kind: TrendKind,
    /// Days covered by the samples in the 30 day window.
    pub days: i64,
    pub avg_discharge_minutes: f64,
    pub power_mode_ratio: f64,
    pub cycles: u32,
}

/// Bounded sample list plus the charge cycle counter. Serialized as
/// `{"history": [...], "cycles": n, "last_cycle_at": ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryHistory {
    #[serde(rename = "history")]
    samples: VecDeque<Sample>,
    cycles: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_cycle_at: Option<DateTime<Utc>>,
}

impl BatteryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn push(&mut self, sample: Sample) {
        self.detect_cycle(&sample);
        self.samples.push_back(sample);
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// A cycle is a drain to 20% or below followed by a charge to 95% or
    /// more within the last hour of samples, counted at most once a day.
    fn detect_cycle(&mut self, sample: &Sample) {
        if sample.on_battery || self.samples.len() < 3 {
            return;
        }

        let now = sample.timestamp;
        let recent: Vec<&Sample> = self
            .samples
            .iter()
            .rev()
            .take(20)
            .filter(|s| now - s.timestamp < TimeDelta::hours(1))
            .collect();
        if recent.len() < 3 {
            return;
        }

        let Some(min_on_battery) = recent
            .iter()
            .filter(|s| s.on_battery)
            .map(|s| s.battery_level)
            .min()
        else {
            return;
        };
        let max_level = recent.iter().map(|s| s.battery_level).max().unwrap_or(0);
        let cooled_down = self
            .last_cycle_at
            .is_none_or(|at| now - at > TimeDelta::days(1));

        if min_on_battery <= 20 && max_level >= 95 && cooled_down {
            self.cycles += 1;
            self.last_cycle_at = Some(now);
            info!(cycles = self.cycles, "charge cycle detected");
        }
    }

    fn low_power_ratio<'a>(samples: impl Iterator<Item = &'a Sample>) -> f64 {
        let (low, total) = samples.fold((0usize, 0usize), |(low, total), s| {
            (low + usize::from(s.is_low_power()), total + 1)
        });
        if total == 0 { 0.0 } else { low as f64 / total as f64 }
    }

    /// 0..=100, higher is better. 100 until ten samples exist.
    pub fn longevity_score(&self, now: DateTime<Utc>) -> f64 {
        if self.samples.len() < 10 {
            return 100.0;
        }

        let lpm_ratio = Self::low_power_ratio(self.samples.iter());
        let deep_discharges = self.samples.iter().filter(|s| s.battery_level <= 10).count();

        let mut score = 100.0;
        score -= lpm_ratio * 20.0;
        score -= deep_discharges as f64 * 5.0;
        score -= f64::from(self.cycles) * 0.1;

        if let Some(first) = self.samples.iter().map(|s| s.timestamp).min() {
            score -= (now - first).num_days() as f64 * 0.001;
        }

        score.clamp(0.0, 100.0)
    }

    /// Suggested percentage threshold, from the levels at which Low Power
    /// Mode has been on: the mean of their mode and median, kept in 15..=50.
    pub fn smart_threshold(&self) -> Option<u8> {
        if self.samples.len() < 20 {
            return None;
        }

        let levels: Vec<u8> = self
            .samples
            .iter()
            .filter(|s| s.is_low_power())
            .map(|s| s.battery_level)
            .collect();
        if levels.is_empty() {
            return None;
        }

        let mode = most_common(&levels)?;
        let median = median(&levels)?;
        let recommended = ((f64::from(mode) + median) / 2.0) as u8;
        Some(recommended.clamp(15, 50))
    }

    /// Discharge trend over the last 30 days. `None` while there is too
    /// little data.
    pub fn health_trend(&self, now: DateTime<Utc>) -> Option<HealthTrend> {
        if self.samples.len() < 10 {
            return None;
        }

        let cutoff = now - TimeDelta::days(30);
        let recent: Vec<&Sample> = self.samples.iter().filter(|s| s.timestamp > cutoff).collect();
        if recent.len() < 5 {
            return None;
        }

        let estimates: Vec<u32> = recent
            .iter()
            .filter(|s| s.on_battery)
            .filter_map(|s| s.time_remaining_minutes)
            .filter(|m| *m > 0)
            .collect();
        let avg = if estimates.is_empty() {
            180.0
        } else {
            estimates.iter().map(|m| f64::from(*m)).sum::<f64>() / estimates.len() as f64
        };

        let days = (now - recent[0].timestamp).num_days();
        let ratio = Self::low_power_ratio(recent.iter().copied());

        let kind = if ratio > 0.3 {
            TrendKind::FrequentLpm
        } else if avg > 300.0 {
            TrendKind::Excellent
        } else if avg > 240.0 {
            TrendKind::Good
        } else if avg > 180.0 {
            TrendKind::Fair
        } else {
            TrendKind::Poor
        };

        Some(HealthTrend {
            kind,
            days,
            avg_discharge_minutes: avg.max(30.0),
            power_mode_ratio: ratio,
            cycles: self.cycles,
        })
    }
}

/// Most frequent value; ties go to the value seen first.
fn most_common(values: &[u8]) -> Option<u8> {
    let mut counts = [0usize; 256];
    for v in values {
        counts[usize::from(*v)] += 1;
    }
    let best = values.iter().map(|v| counts[usize::from(*v)]).max()?;
    values.iter().copied().find(|v| counts[usize::from(*v)] == best)
}

fn median(values: &[u8]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(f64::from(sorted[n / 2])),
        _ => Some((f64::from(sorted[n / 2 - 1]) + f64::from(sorted[n / 2])) / 2.0),
    }
}

/// History persisted to a JSON file, saved every ten minutes or whenever
/// the level moves by five points.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    history: BatteryHistory,
    last_saved: Option<DateTime<Utc>>,
    last_level: Option<u8>,
}

impl HistoryStore {
    /// BATTERY_SAVER_HISTORY env var, else ~/.battery_saver_history.json.
    pub fn default_path() -> PathBuf {
        std::env::var("BATTERY_SAVER_HISTORY")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".battery_saver_history.json")))
            .unwrap_or_else(|| PathBuf::from(".battery_saver_history.json"))
    }

    /// Open the store, starting empty if the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let history = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "discarding unreadable history");
                BatteryHistory::default()
            }),
            Err(_) => BatteryHistory::default(),
        };
        debug!(path = %path.display(), samples = history.len(), "opened history");
        Self {
            path,
            history,
            last_saved: None,
            last_level: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn history(&self) -> &BatteryHistory {
        &self.history
    }

    /// Append a sample. Returns whether the file was written.
    pub fn record(&mut self, sample: Sample) -> Result<bool> {
        let now = sample.timestamp;
        let level = sample.battery_level;
        self.history.push(sample);

        let moved = self.last_level.is_none_or(|last| last.abs_diff(level) >= 5);
        let stale = self
            .last_saved
            .is_none_or(|at| now - at > TimeDelta::minutes(10));
        self.last_level = Some(level);

        if moved || stale {
            self.save()?;
            self.last_saved = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.history)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn sample(minute: i64, level: u8, on_battery: bool, low: bool) -> Sample {
        Sample {
            timestamp: t0() + TimeDelta::minutes(minute),
            battery_level: level,
            power_mode: u8::from(low),
            on_battery,
            time_remaining_minutes: on_battery.then_some(200),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut h = BatteryHistory::new();
        for i in 0..(MAX_SAMPLES as i64 + 25) {
            h.push(sample(i, 50, true, false));
        }
        assert_eq!(h.len(), MAX_SAMPLES);
        assert_eq!(h.samples().next().unwrap().timestamp, t0() + TimeDelta::minutes(25));
    }

    #[test]
    fn test_cycle_detected_after_drain_and_charge() {
        let mut h = BatteryHistory::new();
        h.push(sample(0, 30, true, false));
        h.push(sample(10, 18, true, true));
        h.push(sample(20, 60, false, false));
        h.push(sample(40, 96, false, false));
        assert_eq!(h.cycles(), 0);
        // Next AC sample sees the 96% in history and counts the cycle.
        h.push(sample(45, 100, false, false));
        assert_eq!(h.cycles(), 1);
        // Not twice in the same day.
        h.push(sample(50, 100, false, false));
        assert_eq!(h.cycles(), 1);
    }

    #[test]
    fn test_no_cycle_without_deep_drain() {
        let mut h = BatteryHistory::new();
        h.push(sample(0, 60, true, false));
        h.push(sample(10, 45, true, false));
        h.push(sample(20, 80, false, false));
        h.push(sample(30, 97, false, false));
        h.push(sample(35, 100, false, false));
        assert_eq!(h.cycles(), 0);
    }

    #[test]
    fn test_no_cycle_outside_one_hour() {
        let mut h = BatteryHistory::new();
        h.push(sample(0, 10, true, false));
        h.push(sample(200, 70, false, false));
        h.push(sample(210, 96, false, false));
        h.push(sample(220, 100, false, false));
        h.push(sample(230, 100, false, false));
        assert_eq!(h.cycles(), 0);
    }

    #[test]
    fn test_longevity_score_defaults_with_little_data() {
        let mut h = BatteryHistory::new();
        for i in 0..9 {
            h.push(sample(i, 5, true, true));
        }
        assert_eq!(h.longevity_score(t0()), 100.0);
    }

    #[test]
    fn test_longevity_score_penalties() {
        let mut h = BatteryHistory::new();
        // 10 samples: 5 in LPM, 2 deep discharges.
        for i in 0..10 {
            let level = if i < 2 { 8 } else { 50 };
            h.push(sample(i, level, true, i % 2 == 0));
        }
        let score = h.longevity_score(t0() + TimeDelta::minutes(10));
        // 100 - 0.5*20 - 2*5 = 80, age under a day.
        assert!((score - 80.0).abs() < 1e-9, "score {score}");
        assert_eq!(Grade::from_score(score), Grade::Good);
    }

    #[test]
    fn test_longevity_score_clamps_at_zero() {
        let mut h = BatteryHistory::new();
        for i in 0..30 {
            h.push(sample(i, 3, true, false));
        }
        assert_eq!(h.longevity_score(t0()), 0.0);
        assert_eq!(Grade::from_score(0.0), Grade::Critical);
    }

    #[test]
    fn test_smart_threshold_needs_twenty_samples() {
        let mut h = BatteryHistory::new();
        for i in 0..19 {
            h.push(sample(i, 30, true, true));
        }
        assert_eq!(h.smart_threshold(), None);
        h.push(sample(19, 30, true, true));
        assert_eq!(h.smart_threshold(), Some(30));
    }

    #[test]
    fn test_smart_threshold_none_without_lpm() {
        let mut h = BatteryHistory::new();
        for i in 0..25 {
            h.push(sample(i, 30, true, false));
        }
        assert_eq!(h.smart_threshold(), None);
    }

    #[test]
    fn test_smart_threshold_mode_median_and_bounds() {
        let mut h = BatteryHistory::new();
        for i in 0..17 {
            h.push(sample(i, 80, true, false));
        }
        // LPM levels: 20, 20, 30 -> mode 20, median 20 -> 20.
        h.push(sample(17, 20, true, true));
        h.push(sample(18, 20, true, true));
        h.push(sample(19, 30, true, true));
        assert_eq!(h.smart_threshold(), Some(20));

        // LPM levels 90 only -> clamped to 50.
        let mut high = BatteryHistory::new();
        for i in 0..20 {
            high.push(sample(i, 90, true, true));
        }
        assert_eq!(high.smart_threshold(), Some(50));

        // LPM levels 5 only -> clamped to 15.
        let mut low = BatteryHistory::new();
        for i in 0..20 {
            low.push(sample(i, 5, true, true));
        }
        assert_eq!(low.smart_threshold(), Some(15));
    }

    #[test]
    fn test_most_common_and_median() {
        assert_eq!(most_common(&[3, 1, 1, 3]), Some(3));
        assert_eq!(most_common(&[2, 5, 5]), Some(5));
        assert_eq!(median(&[4, 1, 3, 2]), Some(2.5));
        assert_eq!(median(&[7]), Some(7.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_health_trend_classification() {
        let mut h = BatteryHistory::new();
        for i in 0..12 {
            let mut s = sample(i, 70, true, false);
            s.time_remaining_minutes = Some(320);
            h.push(s);
        }
        let trend = h.health_trend(t0() + TimeDelta::days(2)).unwrap();
        assert_eq!(trend.kind, TrendKind::Excellent);
        assert_eq!(trend.days, 2);
        assert_eq!(trend.avg_discharge_minutes, 320.0);
        assert_eq!(trend.power_mode_ratio, 0.0);
    }

    #[test]
    fn test_health_trend_frequent_lpm_and_default_estimate() {
        let mut h = BatteryHistory::new();
        for i in 0..10 {
            let mut s = sample(i, 40, false, i < 4);
            s.time_remaining_minutes = None;
            h.push(s);
        }
        let trend = h.health_trend(t0()).unwrap();
        assert_eq!(trend.kind, TrendKind::FrequentLpm);
        assert_eq!(trend.avg_discharge_minutes, 180.0);
    }

    #[test]
    fn test_health_trend_ignores_old_samples() {
        let mut h = BatteryHistory::new();
        for i in 0..10 {
            h.push(sample(i, 40, true, false));
        }
        assert_eq!(h.health_trend(t0() + TimeDelta::days(45)), None);
    }

    #[test]
    fn test_store_saves_on_movement_or_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::open(&path);

        assert!(store.record(sample(0, 80, true, false)).unwrap());
        assert!(!store.record(sample(1, 79, true, false)).unwrap());
        assert!(store.record(sample(2, 74, true, false)).unwrap());
        assert!(!store.record(sample(5, 74, true, false)).unwrap());
        assert!(store.record(sample(13, 74, true, false)).unwrap());

        let reopened = HistoryStore::open(&path);
        assert_eq!(reopened.history().len(), 5);
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"history\""));
        assert!(raw.contains("\"cycles\": 0"));
    }

    #[test]
    fn test_store_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "[[[").unwrap();
        assert!(HistoryStore::open(&path).history().is_empty());
    }
}
