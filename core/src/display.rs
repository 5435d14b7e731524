//! Menu-bar glyphs, menu labels and the text shown in dialogs and by the CLI.

use std::fmt::Write as _;

use crate::config::{IconStyle, SaverConfig, ThresholdMode};
use crate::health::BatteryHealth;
use crate::history::{BatteryHistory, Grade, HealthTrend};
use crate::pmset::{format_minutes, BatteryReading, PowerMode};

pub const APP_NAME: &str = "Battery Saver";

/// Title for the menu-bar item.
pub fn status_glyph(
    config: &SaverConfig,
    reading: Option<&BatteryReading>,
    mode: Option<PowerMode>,
) -> String {
    let low_power = mode.is_some_and(PowerMode::is_low);

    if config.show_percentage {
        if let Some(r) = reading {
            return format!("{}%", r.percent);
        }
    }

    match config.icon_style {
        IconStyle::Minimal if low_power => "\u{1F343}".into(), // 🍃
        IconStyle::Minimal => "\u{26A1}".into(),               // ⚡
        IconStyle::Full => {
            let glyph = match reading {
                _ if low_power => "\u{1F4A4}",                                     // 💤
                Some(r) if !r.on_battery() => "\u{1F50C}",                         // 🔌
                Some(r) if r.percent <= 20 => "\u{1FAAB}",                         // 🪫
                Some(r) if r.percent <= config.threshold => "\u{26A1}",            // ⚡
                _ => "\u{1F50B}",                                                  // 🔋
            };
            glyph.into()
        }
    }
}

pub fn threshold_title(config: &SaverConfig) -> String {
    match config.threshold_mode {
        ThresholdMode::Percentage if config.smart_auto_enabled => {
            "Threshold: Smart \u{2728}".into()
        }
        ThresholdMode::Percentage => format!("Threshold: {}%", config.threshold),
        ThresholdMode::Time => format!("Threshold: {} minutes", config.time_threshold_minutes),
    }
}

pub fn mode_label(mode: ThresholdMode) -> &'static str {
    match mode {
        ThresholdMode::Percentage => "Mode: Battery % \u{1F504}",
        ThresholdMode::Time => "Mode: Time Remaining \u{23F1} \u{1F504}",
    }
}

pub fn smart_auto_label(enabled: bool) -> &'static str {
    if enabled {
        "Smart Auto: ON \u{2728}"
    } else {
        "Smart Auto: OFF"
    }
}

/// Threshold as a short phrase: `20%` or `1:30 remaining`.
pub fn threshold_phrase(config: &SaverConfig) -> String {
    match config.threshold_mode {
        ThresholdMode::Percentage => format!("{}%", config.threshold),
        ThresholdMode::Time => {
            format!("{} remaining", format_minutes(config.time_threshold_minutes))
        }
    }
}

/// "Current Battery" dialog body.
pub fn battery_info(
    config: &SaverConfig,
    reading: &BatteryReading,
    health: Option<&BatteryHealth>,
    suggestion: Option<u8>,
) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "Battery Level: {}%", reading.percent);
    let _ = writeln!(msg, "Power Source: {}", reading.source.label());
    if let Some(estimate) = reading.estimate_text() {
        let _ = writeln!(msg, "Time Remaining: {estimate}");
    }
    let _ = writeln!(msg, "Threshold: {}", threshold_phrase(config));

    if let Some(h) = health {
        msg.push_str("\nBattery Health:\n");
        if let Some(v) = &h.max_capacity {
            let _ = writeln!(msg, "Maximum Capacity: {v}");
        }
        if let Some(v) = &h.condition {
            let _ = writeln!(msg, "Condition: {v}");
        }
        if let Some(v) = &h.cycle_count {
            let _ = writeln!(msg, "Cycle Count: {v}");
        }
    }

    if let Some(s) = suggestion.filter(|s| *s != config.threshold) {
        let _ = write!(msg, "\n\u{1F3AF} Smart Recommendation: {s}% threshold");
    }
    msg.trim_end().to_string()
}

/// Analytics dashboard body.
pub fn analytics_report(
    config: &SaverConfig,
    history: &BatteryHistory,
    score: f64,
    trend: Option<&HealthTrend>,
    suggestion: Option<u8>,
) -> String {
    let mut msg = String::new();
    let _ = writeln!(msg, "Battery Cycles Tracked: {}\n", history.cycles());
    let _ = writeln!(
        msg,
        "Battery Longevity Score: {score:.1}/100 ({})\n",
        Grade::from_score(score).label()
    );

    match trend {
        Some(t) => {
            let avg = t.avg_discharge_minutes as u32;
            let _ = writeln!(msg, "Battery Health Trend: {}", t.kind.title());
            let _ = writeln!(msg, "{}", t.kind.description());
            let _ = writeln!(msg, "Avg. Discharge Time: {}", format_minutes(avg));
            let _ = writeln!(msg, "Low Power Mode Usage: {:.1}%", t.power_mode_ratio * 100.0);
            let _ = writeln!(msg, "Analysis Period: {} days\n", t.days);
        }
        None => msg.push_str("Battery Trend: Collecting data (need more usage history)\n\n"),
    }

    match suggestion.filter(|s| *s != config.threshold) {
        Some(s) => {
            let _ = writeln!(msg, "\u{1F3AF} Smart Threshold Suggestion: {s}%");
            msg.push_str("(Based on your usage patterns)\n");
            let _ = writeln!(msg, "Current threshold: {}%\n", config.threshold);
        }
        None => msg.push_str("\u{1F3AF} Smart Threshold: Using optimal threshold\n\n"),
    }

    msg.push_str("\u{1F4A1} Battery Optimization Tips:\n");
    msg.push_str("\u{2022} Maintain battery above 20% when possible\n");
    msg.push_str("\u{2022} Use Low Power Mode for extended battery life\n");
    msg.push_str("\u{2022} Calibrate battery monthly by fully charging and discharging\n");
    if history.cycles() > 500 {
        msg.push_str("\u{2022} Consider battery replacement soon (high cycle count)\n");
    }
    if score < 70.0 {
        msg.push_str("\u{2022} Avoid frequent deep discharges (<20%)\n");
        msg.push_str("\u{2022} Use Low Power Mode more often\n");
    }
    match trend {
        Some(t) if t.power_mode_ratio < 0.1 => {
            msg.push_str("\u{2022} Consider lowering threshold for better battery life\n");
        }
        Some(_) => {}
        None => msg.push_str("\u{2022} Tips will improve with more usage data\n"),
    }

    msg.trim_end().to_string()
}

pub fn about(config: &SaverConfig) -> String {
    let mode = match config.threshold_mode {
        ThresholdMode::Percentage => "Battery %",
        ThresholdMode::Time => "Time Remaining",
    };
    let legend = match config.icon_style {
        IconStyle::Full => {
            "\u{1F4A4} - Low Power Mode ON\n\
             \u{1F50C} - Charging (AC Power)\n\
             \u{1F50B} - On Battery (normal)\n\
             \u{1FAAB} - Low Battery\n\
             \u{26A1} - At Threshold"
        }
        IconStyle::Minimal => "\u{26A1} - Monitoring active\n\u{1F343} - Low Power Mode ON",
    };
    format!(
        "Automatic Low Power Mode Manager for macOS\n\n\
         Version: {}\n\
         Current Threshold: {}\n\
         Mode: {mode}\n\
         Smart Auto: {}\n\n\
         Icon Legend:\n{legend}\n\n\
         Automatically enables Low Power Mode when your battery reaches the specified threshold.",
        env!("CARGO_PKG_VERSION"),
        threshold_phrase(config),
        if config.smart_auto_enabled { "Enabled" } else { "Disabled" },
    )
}
