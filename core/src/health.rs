// Battery health from `system_profiler SPPowerDataType`.

use crate::error::Result;
use crate::shell::{Shell, PROFILER_TIMEOUT};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatteryHealth {
    pub cycle_count: Option<String>,
    pub condition: Option<String>,
    pub max_capacity: Option<String>,
}

/// Pull the "Health Information:" block out of the profiler report.
///
/// ```text
///       Health Information:
///           Cycle Count: 87
///           Condition: Normal
///           Maximum Capacity: 91%
/// ```
pub fn parse_health(text: &str) -> Option<BatteryHealth> {
    let mut health = BatteryHealth::default();
    let mut in_section = false;

    for line in text.lines() {
        if line.contains("Health Information:") {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }

        let trimmed = line.trim();
        let Some((key, value)) = trimmed.split_once(':') else {
            if trimmed.is_empty() {
                continue;
            }
            break;
        };
        let value = Some(value.trim().to_string());
        match key.trim() {
            "Cycle Count" => health.cycle_count = value,
            "Condition" => health.condition = value,
            "Maximum Capacity" => health.max_capacity = value,
            _ => {}
        }
    }

    (health != BatteryHealth::default()).then_some(health)
}

pub fn read_health<S: Shell>(shell: &S) -> Result<Option<BatteryHealth>> {
    let out = shell
        .run("system_profiler", &["SPPowerDataType"], PROFILER_TIMEOUT)?
        .checked("system_profiler")?;
    Ok(parse_health(&out.stdout))
}
