use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// BATTERY_SAVER_LOG env var, else ~/.battery_saver_daemon.log.
pub fn log_path() -> PathBuf {
    std::env::var("BATTERY_SAVER_LOG")
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".battery_saver_daemon.log")))
        .unwrap_or_else(|| PathBuf::from(".battery_saver_daemon.log"))
}

/// Daemon logging: stderr plus an append-only log file, no ANSI colour.
pub fn init_daemon(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).ok();
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr.and(Mutex::new(file)))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

/// Last `lines` lines of the log, or `None` if there is no log yet.
pub fn tail(path: &Path, lines: usize) -> Result<Option<Vec<String>>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(Some(all[start..].iter().map(|l| l.to_string()).collect()))
}
