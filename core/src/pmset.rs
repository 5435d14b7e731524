//! Reading and writing power settings through `pmset`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SaverError};
use crate::notify::sanitize;
use crate::shell::{Shell, PROMPT_TIMEOUT, QUICK_TIMEOUT};

/// Where the machine is currently drawing power from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Battery,
    Ac,
}

impl PowerSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Battery => "Battery",
            Self::Ac => "AC Power",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    Discharging,
    Charging,
    Charged,
    /// "AC attached" / "not charging" (optimized charging holds).
    NotCharging,
    FinishingCharge,
    Unknown,
}

impl ChargeState {
    fn parse(segment: &str) -> Self {
        match segment.trim().to_ascii_lowercase().as_str() {
            "discharging" => Self::Discharging,
            "charging" => Self::Charging,
            "charged" => Self::Charged,
            "ac attached" | "not charging" => Self::NotCharging,
            "finishing charge" => Self::FinishingCharge,
            _ => Self::Unknown,
        }
    }
}

/// The time estimate pmset prints after the charge state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimate {
    /// Minutes of battery life left.
    Remaining(u32),
    /// Minutes until the battery is full.
    UntilFull(u32),
    /// pmset printed "(no estimate)".
    Calculating,
    Unknown,
}

/// One parsed `pmset -g batt` reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    pub percent: u8,
    pub source: PowerSource,
    pub state: ChargeState,
    pub estimate: Estimate,
}

impl BatteryReading {
    pub fn on_battery(&self) -> bool {
        self.source == PowerSource::Battery
    }

    /// Battery minutes left, only known while discharging with an estimate.
    pub fn minutes_remaining(&self) -> Option<u32> {
        match self.estimate {
            Estimate::Remaining(m) => Some(m),
            _ => None,
        }
    }

    /// Human readable estimate, e.g. `3:45`, `1:02 until full`, `Calculating...`.
    pub fn estimate_text(&self) -> Option<String> {
        match self.estimate {
            Estimate::Remaining(m) => Some(format_minutes(m)),
            Estimate::UntilFull(m) => Some(format!("{} until full", format_minutes(m))),
            Estimate::Calculating => Some("Calculating...".into()),
            Estimate::Unknown if self.state == ChargeState::Charging => Some("Charging".into()),
            Estimate::Unknown => None,
        }
    }
}

/// Power mode as exposed by `pmset`: 0 automatic, 1 low power, 2 high power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerMode {
    #[default]
    Automatic,
    Low,
    High,
}

impl PowerMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Automatic),
            1 => Some(Self::Low),
            2 => Some(Self::High),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Automatic => 0,
            Self::Low => 1,
            Self::High => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Automatic => "Automatic",
            Self::Low => "Low Power Mode",
            Self::High => "High Power Mode",
        }
    }

    pub fn is_low(self) -> bool {
        self == Self::Low
    }
}

/// Low power settings per power source, from `pmset -g custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerSettings {
    pub battery: Option<PowerMode>,
    pub ac: Option<PowerMode>,
}

impl PowerSettings {
    /// The mode that applies to the given source; unset means automatic.
    pub fn mode_for(&self, source: PowerSource) -> PowerMode {
        match source {
            PowerSource::Battery => self.battery,
            PowerSource::Ac => self.ac,
        }
        .unwrap_or_default()
    }
}

/// How far `set_low_power` may go to obtain root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Only `sudo -n`; used by the background daemon.
    NonInteractive,
    /// Fall back to an AppleScript administrator prompt.
    Prompt,
}

/// Which route actually applied the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    Sudo,
    AdminPrompt,
}

/// Format minutes as `H:MM`.
pub fn format_minutes(minutes: u32) -> String {
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

fn parse_hmm(token: &str) -> Option<u32> {
    let (h, m) = token.split_once(':')?;
    let hours: u32 = h.parse().ok()?;
    let mins: u32 = m.parse().ok()?;
    if mins >= 60 {
        return None;
    }
    hours.checked_mul(60)?.checked_add(mins)
}

/// Parse the output of `pmset -g batt`.
///
/// ```text
/// Now drawing from 'Battery Power'
///  -InternalBattery-0 (id=4653155)	85%; discharging; 3:45 remaining present: true
/// ```
pub fn parse_batt(text: &str) -> Result<BatteryReading> {
    let source = if text.contains("Battery Power") {
        PowerSource::Battery
    } else {
        PowerSource::Ac
    };

    let line = text
        .lines()
        .find(|l| l.contains("InternalBattery"))
        .or_else(|| text.lines().find(|l| l.contains('%')))
        .ok_or(SaverError::NoBattery)?;

    let mut segments = line.split(';');
    let head = segments.next().unwrap_or_default();
    let percent = head
        .split_whitespace()
        .last()
        .and_then(|tok| tok.strip_suffix('%'))
        .and_then(|tok| tok.parse::<u8>().ok())
        .filter(|p| *p <= 100)
        .ok_or_else(|| SaverError::Parse(format!("no battery percentage in {:?}", line.trim())))?;

    let state = segments.next().map(ChargeState::parse).unwrap_or(ChargeState::Unknown);
    let rest = segments.collect::<Vec<_>>().join(";");
    let estimate = parse_estimate(&rest, source, state);

    Ok(BatteryReading {
        percent,
        source,
        state,
        estimate,
    })
}

fn parse_estimate(rest: &str, source: PowerSource, state: ChargeState) -> Estimate {
    let rest = rest.trim();
    if rest.contains("(no estimate)") {
        return Estimate::Calculating;
    }

    let mut tokens = rest.split_whitespace();
    let Some(minutes) = tokens.next().and_then(parse_hmm) else {
        return Estimate::Unknown;
    };
    let tail = tokens.collect::<Vec<_>>().join(" ");

    if tail.starts_with("until full") || state == ChargeState::Charging {
        Estimate::UntilFull(minutes)
    } else if tail.starts_with("remaining") && source == PowerSource::Battery {
        Estimate::Remaining(minutes)
    } else {
        // e.g. "charged; 0:00 remaining" while on AC.
        Estimate::Unknown
    }
}

/// Parse the output of `pmset -g custom`.
///
/// `powermode` (0/1/2, newer macOS) wins over `lowpowermode` (0/1) within a
/// section. Keys listed before any section header apply to both sources.
pub fn parse_custom(text: &str) -> PowerSettings {
    #[derive(Default, Clone, Copy)]
    struct Section {
        low: Option<u8>,
        mode: Option<u8>,
    }

    impl Section {
        fn resolve(self) -> Option<PowerMode> {
            self.mode
                .and_then(PowerMode::from_code)
                .or_else(|| {
                    self.low.map(|v| {
                        if v == 0 {
                            PowerMode::Automatic
                        } else {
                            PowerMode::Low
                        }
                    })
                })
        }
    }

    let mut loose = Section::default();
    let mut battery = Section::default();
    let mut ac = Section::default();
    let mut current: Option<PowerSource> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Battery Power:") {
            current = Some(PowerSource::Battery);
            continue;
        }
        if trimmed.starts_with("AC Power:") {
            current = Some(PowerSource::Ac);
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.last()) else {
            continue;
        };
        let Ok(value) = value.parse::<u8>() else {
            continue;
        };

        let section = match current {
            Some(PowerSource::Battery) => &mut battery,
            Some(PowerSource::Ac) => &mut ac,
            None => &mut loose,
        };
        if key.eq_ignore_ascii_case("lowpowermode") {
            section.low = Some(value);
        } else if key.eq_ignore_ascii_case("powermode") {
            section.mode = Some(value);
        }
    }

    PowerSettings {
        battery: battery.resolve().or_else(|| loose.resolve()),
        ac: ac.resolve().or_else(|| loose.resolve()),
    }
}

/// Thin client over the `pmset` binary.
pub struct Pmset<S> {
    shell: S,
    prompt: String,
}

impl<S: Shell> Pmset<S> {
    pub fn new(shell: S) -> Self {
        Self {
            shell,
            prompt: "Battery Saver needs your password to change Low Power Mode.".into(),
        }
    }

    /// Text shown in the administrator password dialog.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn battery(&self) -> Result<BatteryReading> {
        let out = self
            .shell
            .run("pmset", &["-g", "batt"], QUICK_TIMEOUT)?
            .checked("pmset")?;
        parse_batt(&out.stdout)
    }

    pub fn settings(&self) -> Result<PowerSettings> {
        let out = self
            .shell
            .run("pmset", &["-g", "custom"], QUICK_TIMEOUT)?
            .checked("pmset")?;
        Ok(parse_custom(&out.stdout))
    }

    pub fn current_mode(&self, source: PowerSource) -> Result<PowerMode> {
        Ok(self.settings()?.mode_for(source))
    }

    /// Switch Low Power Mode for the battery profile (`pmset -b`).
    pub fn set_low_power(&self, enabled: bool, escalation: Escalation) -> Result<Elevation> {
        let value = if enabled { "1" } else { "0" };

        match self.shell.run(
            "sudo",
            &["-n", "pmset", "-b", "lowpowermode", value],
            QUICK_TIMEOUT,
        ) {
            Ok(out) if out.success() => {
                info!(enabled, "low power mode set via sudo");
                return Ok(Elevation::Sudo);
            }
            Ok(out) => debug!(stderr = %out.stderr.trim(), "passwordless sudo unavailable"),
            Err(e) => debug!(error = %e, "sudo failed"),
        }

        if escalation == Escalation::NonInteractive {
            return Err(SaverError::Permission(
                "passwordless sudo for pmset is not configured; run `battery-saver setup`".into(),
            ));
        }

        let script = format!(
            "do shell script \"pmset -b lowpowermode {value}\" with administrator privileges with prompt \"{}\"",
            sanitize(&self.prompt)
        );
        let out = self.shell.run("osascript", &["-e", &script], PROMPT_TIMEOUT)?;
        if out.success() {
            info!(enabled, "low power mode set via administrator prompt");
            Ok(Elevation::AdminPrompt)
        } else {
            Err(SaverError::Permission(format!(
                "administrator prompt failed: {}",
                out.stderr.trim()
            )))
        }
    }
}
