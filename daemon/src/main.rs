mod logs;
mod service;

use anyhow::{bail, Context, Result};
use battery_saver_core::config::{ConfigStore, MAX_THRESHOLD, MIN_CHECK_INTERVAL, MIN_THRESHOLD};
use battery_saver_core::display::threshold_phrase;
use battery_saver_core::history::HistoryStore;
use battery_saver_core::{Escalation, Monitor, OsaNotifier, Pmset, SystemShell, ThresholdMode};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "battery-saver")]
#[command(about = "Turn on macOS Low Power Mode automatically when the battery runs low")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor in the foreground
    Run,
    /// Show settings, daemon state and the current battery
    Status,
    /// Set the battery percentage threshold
    Threshold { percent: u8 },
    /// Set the minutes-remaining threshold used in time mode
    TimeThreshold { minutes: u32 },
    /// Compare against battery percentage or time remaining
    Mode { mode: ModeArg },
    /// Let battery analytics adjust the percentage threshold
    SmartAuto { state: Switch },
    /// Post a notification when Low Power Mode is switched on
    Notifications { state: Switch },
    /// Seconds between battery checks
    Interval { seconds: u64 },
    /// Turn automatic switching on
    Enable,
    /// Turn automatic switching off
    Disable,
    /// Start the daemon in the background
    Start,
    /// Stop running daemons
    Stop,
    /// Stop, then start the daemon
    Restart,
    /// Print the end of the daemon log
    Logs {
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
    /// Show battery analytics
    Analytics,
    /// Switch Low Power Mode now (may ask for a password)
    LowPower { state: Switch },
    /// Allow pmset to run without a password
    Setup,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Percentage,
    Time,
}

impl From<ModeArg> for ThresholdMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Percentage => ThresholdMode::Percentage,
            ModeArg::Time => ThresholdMode::Time,
        }
    }
}

const MAX_TIME_THRESHOLD: u32 = 600;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Run) {
        logs::init_daemon(&logs::log_path())?;
    } else {
        // Control commands print their own output; keep stderr quiet.
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    dispatch(cli.command, &ConfigStore::resolve())
}

fn dispatch(command: Commands, store: &ConfigStore) -> Result<()> {
    match command {
        Commands::Run => service::run(ConfigStore::new(store.path()), HistoryStore::default_path()),
        Commands::Status => status(store),
        Commands::Threshold { percent } => {
            if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&percent) {
                bail!("threshold must be between {MIN_THRESHOLD} and {MAX_THRESHOLD}");
            }
            store.update(|c| c.set_threshold(percent))?;
            println!("Threshold set to {percent}%");
            Ok(())
        }
        Commands::TimeThreshold { minutes } => {
            if !(1..=MAX_TIME_THRESHOLD).contains(&minutes) {
                bail!("time threshold must be between 1 and {MAX_TIME_THRESHOLD} minutes");
            }
            store.update(|c| {
                c.time_threshold_minutes = minutes;
                Ok(())
            })?;
            println!("Time threshold set to {minutes} minutes");
            Ok(())
        }
        Commands::Mode { mode } => {
            let config = store.update(|c| {
                c.threshold_mode = mode.into();
                Ok(())
            })?;
            println!("Mode set; threshold is now {}", threshold_phrase(&config));
            Ok(())
        }
        Commands::SmartAuto { state } => {
            store.update(|c| {
                c.smart_auto_enabled = state.is_on();
                Ok(())
            })?;
            println!("Smart auto {}", on_off(state.is_on()));
            Ok(())
        }
        Commands::Notifications { state } => {
            store.update(|c| {
                c.notifications = state.is_on();
                Ok(())
            })?;
            println!("Notifications {}", on_off(state.is_on()));
            Ok(())
        }
        Commands::Interval { seconds } => {
            if seconds < MIN_CHECK_INTERVAL {
                bail!("interval must be at least {MIN_CHECK_INTERVAL} seconds");
            }
            store.update(|c| {
                c.check_interval = seconds;
                Ok(())
            })?;
            println!("Check interval set to {seconds}s");
            Ok(())
        }
        Commands::Enable => set_enabled(store, true),
        Commands::Disable => set_enabled(store, false),
        Commands::Start => service::start(),
        Commands::Stop => {
            let stopped = service::stop()?;
            if stopped == 0 {
                println!("Daemon is not running");
            } else {
                println!("Stopped {stopped} daemon process(es)");
            }
            Ok(())
        }
        Commands::Restart => {
            service::stop()?;
            service::wait_until_stopped()?;
            service::start()
        }
        Commands::Logs { lines } => {
            let path = logs::log_path();
            match logs::tail(&path, lines)? {
                Some(tail) => tail.iter().for_each(|l| println!("{l}")),
                None => println!("No log file at {}", path.display()),
            }
            Ok(())
        }
        Commands::Analytics => {
            let monitor = monitor(store, Escalation::NonInteractive)
                .with_history(HistoryStore::open(HistoryStore::default_path()));
            println!("{}", monitor.analytics_report());
            Ok(())
        }
        Commands::LowPower { state } => {
            monitor(store, Escalation::Prompt)
                .set_low_power(state.is_on())
                .context("failed to change Low Power Mode")?;
            println!("Low Power Mode {}", on_off(state.is_on()));
            Ok(())
        }
        Commands::Setup => {
            monitor(store, Escalation::Prompt)
                .run_setup()
                .context("setup did not complete")?;
            println!("Passwordless Low Power Mode switching is set up");
            Ok(())
        }
    }
}

fn monitor(
    store: &ConfigStore,
    escalation: Escalation,
) -> Monitor<SystemShell, OsaNotifier<SystemShell>> {
    Monitor::new(
        SystemShell,
        OsaNotifier::new(SystemShell),
        ConfigStore::new(store.path()),
        escalation,
    )
}

fn set_enabled(store: &ConfigStore, enabled: bool) -> Result<()> {
    store.update(|c| {
        c.enabled = enabled;
        Ok(())
    })?;
    println!("Automatic Low Power Mode {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn status(store: &ConfigStore) -> Result<()> {
    let config = store.load();
    println!("Config: {}", store.path().display());
    println!("Monitoring: {}", if config.enabled { "enabled" } else { "disabled" });
    let mode = match config.threshold_mode {
        ThresholdMode::Percentage => "battery %",
        ThresholdMode::Time => "time remaining",
    };
    println!("Threshold: {} ({mode})", threshold_phrase(&config));
    println!("Smart auto: {}", on_off(config.smart_auto_enabled));
    println!("Notifications: {}", on_off(config.notifications));
    println!("Check interval: {}s", config.check_interval);
    println!("Passwordless setup: {}", if config.setup_complete { "done" } else { "not done" });

    let pids = service::running_daemons();
    if pids.is_empty() {
        println!("Daemon: not running");
    } else {
        let list: Vec<String> = pids.iter().map(u32::to_string).collect();
        println!("Daemon: running (pid {})", list.join(", "));
    }

    let pmset = Pmset::new(SystemShell);
    match pmset.battery() {
        Ok(reading) => {
            println!("Battery: {}% on {}", reading.percent, reading.source.label());
            if let Some(left) = reading.estimate_text() {
                println!("Time remaining: {left}");
            }
            if let Ok(mode) = pmset.current_mode(reading.source) {
                println!("Power mode: {}", mode.name());
            }
        }
        Err(e) => println!("Battery: unavailable ({e})"),
    }

    if let Some(tail) = logs::tail(&logs::log_path(), 5)? {
        println!("\nRecent log:");
        tail.iter().for_each(|l| println!("  {l}"));
    }
    Ok(())
}
