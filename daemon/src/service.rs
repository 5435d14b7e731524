//! The foreground monitor loop and the start/stop plumbing around it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use battery_saver_core::history::HistoryStore;
use battery_saver_core::{ConfigStore, Escalation, Monitor, OsaNotifier, Outcome, SystemShell};
use crossbeam_channel::RecvTimeoutError;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};
use tracing::{info, warn};

const DAEMON_NAME: &str = "battery-saver";
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Tick until SIGINT or SIGTERM. Never prompts for a password.
pub fn run(config: ConfigStore, history_path: PathBuf) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("failed to install signal handler")?;

    info!(
        pid = std::process::id(),
        config = %config.path().display(),
        history = %history_path.display(),
        "battery saver daemon started"
    );

    let mut monitor = Monitor::new(
        SystemShell,
        OsaNotifier::new(SystemShell),
        config,
        Escalation::NonInteractive,
    )
    .with_history(HistoryStore::open(history_path));

    loop {
        let report = monitor.tick();
        if let (Some(reading), Outcome::Failed(reason)) = (&report.reading, &report.outcome) {
            warn!(level = reading.percent, %reason, "could not switch low power mode");
        }

        match shutdown_rx.recv_timeout(report.config.check_interval()) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Err(e) = monitor.save_history() {
        warn!(error = %e, "failed to save history on shutdown");
    }
    info!("battery saver daemon stopped");
    Ok(())
}

/// Spawn `battery-saver run` detached from this terminal.
pub fn start() -> Result<()> {
    let running = running_daemons();
    if let Some(pid) = running.first() {
        bail!("daemon already running (pid {pid})");
    }

    let exe = std::env::current_exe().context("failed to locate battery-saver executable")?;
    let mut cmd = Command::new(exe);
    cmd.arg("run")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn().context("failed to start daemon")?;
    println!("Daemon started (pid {})", child.id());
    Ok(())
}

/// SIGTERM every running daemon. Returns how many were signalled.
pub fn stop() -> Result<usize> {
    let sys = process_table();
    let mut stopped = 0;
    for (pid, process) in daemons(&sys) {
        match process.kill_with(Signal::Term) {
            Some(true) => {
                info!(pid = pid.as_u32(), "sent SIGTERM");
                stopped += 1;
            }
            Some(false) => warn!(pid = pid.as_u32(), "failed to signal daemon"),
            None if process.kill() => stopped += 1,
            None => warn!(pid = pid.as_u32(), "failed to kill daemon"),
        }
    }
    Ok(stopped)
}

pub fn wait_until_stopped() -> Result<()> {
    let deadline = Instant::now() + STOP_WAIT;
    while !running_daemons().is_empty() {
        if Instant::now() >= deadline {
            bail!("daemon did not stop within {}s", STOP_WAIT.as_secs());
        }
        thread::sleep(Duration::from_millis(200));
    }
    Ok(())
}

pub fn running_daemons() -> Vec<u32> {
    let sys = process_table();
    let mut pids: Vec<u32> = daemons(&sys).map(|(pid, _)| pid.as_u32()).collect();
    pids.sort_unstable();
    pids
}

fn process_table() -> System {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet),
    );
    sys
}

fn daemons(sys: &System) -> impl Iterator<Item = (&Pid, &Process)> {
    let me = sysinfo::get_current_pid().ok();
    sys.processes()
        .iter()
        .filter(move |(pid, _)| Some(**pid) != me)
        .filter(|(_, process)| is_daemon(process.name(), process.cmd()))
}

/// `battery-saver run`, matched on the process name or argv[0].
fn is_daemon<S: AsRef<OsStr>>(name: &OsStr, cmd: &[S]) -> bool {
    let named = name == OsStr::new(DAEMON_NAME)
        || cmd
            .first()
            .and_then(|arg0| Path::new(arg0.as_ref()).file_name())
            .is_some_and(|n| n == DAEMON_NAME);
    named && cmd.iter().skip(1).any(|a| a.as_ref() == "run")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_daemon_matches_run_subcommand() {
        let name = OsStr::new("battery-saver");
        assert!(is_daemon(name, &["/usr/local/bin/battery-saver", "run"]));
        assert!(!is_daemon(name, &["/usr/local/bin/battery-saver", "status"]));
    }

    #[test]
    fn test_is_daemon_falls_back_to_argv0() {
        let truncated = OsStr::new("battery-sav");
        assert!(is_daemon(truncated, &["/opt/bin/battery-saver", "run"]));
        assert!(!is_daemon(OsStr::new("bash"), &["bash", "run"]));
    }
}
