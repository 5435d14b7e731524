use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum SaverError {
    /// A helper program could not be started or exited unsuccessfully.
    Command(String),
    /// A helper program did not finish within its time budget.
    Timeout { program: String, after: Duration },
    /// `pmset` output did not contain what we expected.
    Parse(String),
    /// The machine reports no internal battery.
    NoBattery,
    /// Changing the power mode needs privileges we could not obtain.
    Permission(String),
    InvalidThreshold(u8),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for SaverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(msg) => write!(f, "Command failed: {msg}"),
            Self::Timeout { program, after } => {
                write!(f, "{program} timed out after {}s", after.as_secs())
            }
            Self::Parse(msg) => write!(f, "Parse error: {msg}"),
            Self::NoBattery => write!(f, "No internal battery found"),
            Self::Permission(msg) => write!(f, "Permission denied: {msg}"),
            Self::InvalidThreshold(value) => write!(
                f,
                "Threshold must be between {}% and {}% (got {value}%)",
                crate::config::MIN_THRESHOLD,
                crate::config::MAX_THRESHOLD
            ),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for SaverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SaverError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for SaverError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, SaverError>;
