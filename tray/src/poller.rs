//! Background thread that owns the [`Monitor`]. The UI sends it commands
//! and gets tick reports back; nothing here touches the event loop directly.

use std::thread::{self, JoinHandle};
use std::time::Instant;

use battery_saver_core::display::{self, APP_NAME};
use battery_saver_core::notify::Notifier;
use battery_saver_core::shell::Shell;
use battery_saver_core::{Monitor, OsaNotifier, TickReport};
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use tracing::{info, warn};

use crate::state::ThresholdChoice;

const LAUNCH_TITLE: &str = "Battery Saver is Running";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    SetThreshold(ThresholdChoice),
    ToggleMode,
    ToggleSmartAuto,
    ToggleEnabled,
    ToggleShowPercentage,
    LowPowerNow(bool),
    ShowBattery,
    ShowPowerMode,
    ShowAnalytics,
    ShowAbout,
    RunSetup,
    SetupDeclined,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum PollerEvent {
    Report(TickReport),
    /// First-launch setup was declined.
    Quit,
}

/// Modal dialogs. They block, so the poller only calls them from helper
/// threads.
pub trait Dialogs: Clone + Send + 'static {
    fn alert(&self, title: &str, message: &str);
    fn confirm(&self, title: &str, message: &str, ok: &str, cancel: &str) -> bool;
}

impl<S: Shell + Clone + 'static> Dialogs for OsaNotifier<S> {
    fn alert(&self, title: &str, message: &str) {
        if let Err(e) = OsaNotifier::alert(self, title, message) {
            warn!(error = %e, "failed to show dialog");
        }
    }

    fn confirm(&self, title: &str, message: &str, ok: &str, cancel: &str) -> bool {
        OsaNotifier::confirm(self, title, message, ok, cancel)
    }
}

struct Poller<S, N, D, F> {
    monitor: Monitor<S, N>,
    dialogs: D,
    commands: Sender<Command>,
    sink: F,
}

/// Start the poller. `sink` receives every event; the returned sender
/// drives it.
pub fn spawn<S, N, D, F>(
    monitor: Monitor<S, N>,
    dialogs: D,
    sink: F,
) -> (Sender<Command>, JoinHandle<()>)
where
    S: Shell + 'static,
    N: Notifier + 'static,
    D: Dialogs,
    F: Fn(PollerEvent) + Send + 'static,
{
    let (tx, rx) = unbounded();
    let poller = Poller {
        monitor,
        dialogs,
        commands: tx.clone(),
        sink,
    };

    let handle = thread::spawn(move || {
        let mut poller = poller;
        // No battery check until the setup question is answered.
        let mut awaiting_setup = poller.first_launch();

        let mut next_tick = Instant::now();
        loop {
            if !awaiting_setup && Instant::now() >= next_tick {
                let report = poller.monitor.tick();
                next_tick = Instant::now() + report.config.check_interval();
                (poller.sink)(PollerEvent::Report(report));
            }

            let received = if awaiting_setup {
                rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
            } else {
                rx.recv_deadline(next_tick)
            };
            match received {
                Ok(Command::Shutdown) => break,
                Ok(Command::SetupDeclined) => {
                    info!("setup declined, quitting");
                    (poller.sink)(PollerEvent::Quit);
                    break;
                }
                Ok(cmd) => {
                    if cmd == Command::RunSetup {
                        awaiting_setup = false;
                    }
                    if poller.handle(cmd) {
                        next_tick = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Err(e) = poller.monitor.save_history() {
            warn!(error = %e, "failed to save history");
        }
        info!("poller stopped");
    });

    (tx, handle)
}

impl<S, N, D, F> Poller<S, N, D, F>
where
    S: Shell + 'static,
    N: Notifier + 'static,
    D: Dialogs,
    F: Fn(PollerEvent) + Send + 'static,
{
    /// Offer passwordless setup once. Declining quits the app. Returns
    /// true while the answer is pending; otherwise greets the user.
    fn first_launch(&self) -> bool {
        let config = self.monitor.config_store().load();
        if config.setup_complete {
            self.show(
                LAUNCH_TITLE,
                format!(
                    "Battery Saver is now in your menu bar.\n\n\
                     Low Power Mode will switch on automatically at {}.\n\n\
                     Click the menu bar icon to see battery details or change settings.",
                    display::threshold_phrase(&config)
                ),
            );
            return false;
        }

        let dialogs = self.dialogs.clone();
        let commands = self.commands.clone();
        thread::spawn(move || {
            let accepted = dialogs.confirm(
                APP_NAME,
                "Battery Saver switches Low Power Mode on for you when the battery runs low. \
                 This needs a one-time administrator password so it can run pmset without asking again.",
                "Set Up",
                "Quit",
            );
            let next = if accepted {
                Command::RunSetup
            } else {
                Command::SetupDeclined
            };
            let _ = commands.send(next);
        });
        true
    }

    /// Apply one command. Returns true when a tick should run now.
    fn handle(&self, cmd: Command) -> bool {
        let store = self.monitor.config_store();
        let changed = match cmd {
            Command::Refresh => return true,
            Command::SetThreshold(choice) => store.update(|c| {
                match choice {
                    ThresholdChoice::Percent(p) => {
                        c.set_threshold(p)?;
                        c.smart_auto_enabled = false;
                    }
                    ThresholdChoice::Minutes(m) => c.time_threshold_minutes = m,
                }
                Ok(())
            }),
            Command::ToggleMode => store.update(|c| {
                c.threshold_mode = c.threshold_mode.toggled();
                Ok(())
            }),
            Command::ToggleSmartAuto => {
                let result = store.update(|c| {
                    c.smart_auto_enabled = !c.smart_auto_enabled;
                    Ok(())
                });
                if let Ok(config) = &result {
                    self.explain_smart_auto(config.smart_auto_enabled);
                }
                result
            }
            Command::ToggleEnabled => store.update(|c| {
                c.enabled = !c.enabled;
                Ok(())
            }),
            Command::ToggleShowPercentage => store.update(|c| {
                c.show_percentage = !c.show_percentage;
                Ok(())
            }),
            Command::LowPowerNow(enabled) => {
                match self.monitor.set_low_power(enabled) {
                    Ok(_) => {
                        let body = if enabled {
                            "Low Power Mode enabled."
                        } else {
                            "Low Power Mode disabled."
                        };
                        self.monitor.notifier().notify(APP_NAME, None, body);
                    }
                    Err(e) => self.show("Could not change Low Power Mode", e.to_string()),
                }
                // Show the new mode without re-evaluating, or a manual
                // disable below the threshold would be undone at once.
                (self.sink)(PollerEvent::Report(self.monitor.snapshot()));
                return false;
            }
            Command::ShowBattery => {
                let text = self
                    .monitor
                    .battery_info()
                    .unwrap_or_else(|e| format!("Battery information unavailable: {e}"));
                self.show("Current Battery", text);
                return false;
            }
            Command::ShowPowerMode => {
                let text = self
                    .monitor
                    .power_mode_info()
                    .unwrap_or_else(|e| format!("Power mode unavailable: {e}"));
                self.show("Current Power Mode", text);
                return false;
            }
            Command::ShowAnalytics => {
                self.show("Battery Analytics", self.monitor.analytics_report());
                return false;
            }
            Command::ShowAbout => {
                let config = self.monitor.config_store().load();
                self.show(APP_NAME, display::about(&config));
                return false;
            }
            Command::RunSetup => {
                match self.monitor.run_setup() {
                    Ok(()) => self.show(
                        "Setup Complete",
                        "Low Power Mode will now switch automatically without asking for a password."
                            .into(),
                    ),
                    Err(e) => self.show("Setup Failed", e.to_string()),
                }
                return true;
            }
            Command::SetupDeclined | Command::Shutdown => return false,
        };

        match changed {
            Ok(config) => {
                info!(
                    threshold = %display::threshold_phrase(&config),
                    enabled = config.enabled,
                    smart_auto = config.smart_auto_enabled,
                    "settings changed"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, ?cmd, "failed to update settings");
                false
            }
        }
    }

    fn explain_smart_auto(&self, enabled: bool) {
        let (title, message) = if enabled {
            (
                "Smart Auto On",
                "Battery Saver will learn from your battery history and adjust the \
                 threshold for you.\n\n\
                 Adjustments only apply in Battery % mode and need a few hours of data.",
            )
        } else {
            (
                "Smart Auto Off",
                "The threshold stays exactly where you set it. \
                 Both Battery % and Time Remaining modes are available.",
            )
        };
        self.show(title, message.into());
    }

    fn show(&self, title: &'static str, message: String) {
        let dialogs = self.dialogs.clone();
        thread::spawn(move || dialogs.alert(title, &message));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use battery_saver_core::config::{ConfigStore, SaverConfig, ThresholdMode};
    use battery_saver_core::shell::CommandOutput;
    use battery_saver_core::{Escalation, Outcome, PowerMode, SaverError};
    use crossbeam_channel::Receiver;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    /// Answers pmset like a laptop on battery and remembers the last
    /// Low Power Mode switch.
    #[derive(Clone)]
    struct FakeShell {
        percent: u8,
        low_power: Arc<Mutex<bool>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeShell {
        fn at(percent: u8) -> Self {
            Self {
                percent,
                low_power: Arc::default(),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn sudo_calls(&self) -> Vec<String> {
            self.calls().into_iter().filter(|c| c.starts_with("sudo")).collect()
        }
    }

    impl Shell for FakeShell {
        fn run(
            &self,
            program: &str,
            args: &[&str],
            _timeout: Duration,
        ) -> battery_saver_core::Result<CommandOutput> {
            let line = format!("{program} {}", args.join(" "));
            self.calls.lock().unwrap().push(line.clone());
            let stdout = match line.as_str() {
                "pmset -g batt" => format!(
                    "Now drawing from 'Battery Power'\n -InternalBattery-0 (id=1)\t{}%; discharging; 2:10 remaining present: true\n",
                    self.percent
                ),
                "pmset -g custom" => {
                    let on = u8::from(*self.low_power.lock().unwrap());
                    format!("Battery Power:\n lowpowermode {on}\nAC Power:\n lowpowermode 0\n")
                }
                "sudo -n pmset -b lowpowermode 1" => {
                    *self.low_power.lock().unwrap() = true;
                    String::new()
                }
                "sudo -n pmset -b lowpowermode 0" => {
                    *self.low_power.lock().unwrap() = false;
                    String::new()
                }
                "stat -f %Su /dev/console" => "dana\n".into(),
                l if l.starts_with("osascript") => String::new(),
                _ => return Err(SaverError::Command(format!("unexpected: {line}"))),
            };
            Ok(CommandOutput {
                code: Some(0),
                stdout,
                stderr: String::new(),
            })
        }
    }

    #[derive(Clone, Default)]
    struct Notes(Arc<Mutex<Vec<String>>>);

    impl Notifier for Notes {
        fn notify(&self, _title: &str, _subtitle: Option<&str>, body: &str) {
            self.0.lock().unwrap().push(body.to_string());
        }
    }

    #[derive(Clone)]
    struct FakeDialogs {
        accept: bool,
        /// When set, the setup question stays open until this fires.
        answer_after: Option<Receiver<()>>,
        alerts: Sender<String>,
    }

    impl Dialogs for FakeDialogs {
        fn alert(&self, title: &str, _message: &str) {
            let _ = self.alerts.send(title.to_string());
        }

        fn confirm(&self, _title: &str, _message: &str, _ok: &str, _cancel: &str) -> bool {
            if let Some(gate) = &self.answer_after {
                let _ = gate.recv_timeout(WAIT);
            }
            self.accept
        }
    }

    struct Rig {
        _dir: tempfile::TempDir,
        shell: FakeShell,
        commands: Sender<Command>,
        events: Receiver<PollerEvent>,
        alerts: Receiver<String>,
        notes: Notes,
        handle: JoinHandle<()>,
    }

    impl Rig {
        fn stop(self) {
            self.commands.send(Command::Shutdown).unwrap();
            self.handle.join().unwrap();
        }
    }

    fn rig_with(
        config: SaverConfig,
        shell: FakeShell,
        accept: bool,
        answer_after: Option<Receiver<()>>,
    ) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.save(&config).unwrap();
        let notes = Notes::default();
        let monitor = Monitor::new(shell.clone(), notes.clone(), store, Escalation::NonInteractive);

        let (alert_tx, alerts) = unbounded();
        let (event_tx, events) = unbounded();
        let (commands, handle) = spawn(
            monitor,
            FakeDialogs {
                accept,
                answer_after,
                alerts: alert_tx,
            },
            move |e| {
                let _ = event_tx.send(e);
            },
        );
        Rig {
            _dir: dir,
            shell,
            commands,
            events,
            alerts,
            notes,
            handle,
        }
    }

    fn rig(config: SaverConfig, accept: bool) -> Rig {
        rig_with(config, FakeShell::at(55), accept, None)
    }

    fn configured() -> SaverConfig {
        SaverConfig {
            setup_complete: true,
            check_interval: 3600,
            ..SaverConfig::default()
        }
    }

    fn next_report(events: &Receiver<PollerEvent>) -> TickReport {
        match events.recv_timeout(WAIT).unwrap() {
            PollerEvent::Report(r) => r,
            PollerEvent::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_ticks_on_start_and_after_changes() {
        let r = rig(configured(), true);
        let first = next_report(&r.events);
        assert_eq!(first.reading.map(|b| b.percent), Some(55));

        r.commands.send(Command::SetThreshold(ThresholdChoice::Percent(60))).unwrap();
        let after = next_report(&r.events);
        assert_eq!(after.config.threshold, 60);
        assert!(matches!(after.outcome, Outcome::Switched(_)));
        assert_eq!(r.notes.0.lock().unwrap().len(), 1);
        r.stop();
    }

    #[test]
    fn test_toggle_mode_round_trips() {
        let r = rig(configured(), true);
        next_report(&r.events);
        r.commands.send(Command::ToggleMode).unwrap();
        assert_eq!(next_report(&r.events).config.threshold_mode, ThresholdMode::Time);
        r.commands.send(Command::ToggleMode).unwrap();
        assert_eq!(next_report(&r.events).config.threshold_mode, ThresholdMode::Percentage);
        r.stop();
    }

    #[test]
    fn test_smart_auto_toggle_explains_and_keeps_mode() {
        let r = rig(
            SaverConfig {
                threshold_mode: ThresholdMode::Time,
                ..configured()
            },
            true,
        );
        next_report(&r.events);
        assert_eq!(r.alerts.recv_timeout(WAIT).unwrap(), LAUNCH_TITLE);

        r.commands.send(Command::ToggleSmartAuto).unwrap();
        let report = next_report(&r.events);
        assert!(report.config.smart_auto_enabled);
        assert_eq!(report.config.threshold_mode, ThresholdMode::Time);
        assert_eq!(r.alerts.recv_timeout(WAIT).unwrap(), "Smart Auto On");

        r.commands.send(Command::ToggleSmartAuto).unwrap();
        assert!(!next_report(&r.events).config.smart_auto_enabled);
        assert_eq!(r.alerts.recv_timeout(WAIT).unwrap(), "Smart Auto Off");
        r.stop();
    }

    #[test]
    fn test_manual_disable_below_threshold_sticks() {
        let r = rig_with(configured(), FakeShell::at(15), true, None);
        let first = next_report(&r.events);
        assert!(matches!(first.outcome, Outcome::Switched(_)));

        r.commands.send(Command::LowPowerNow(false)).unwrap();
        let after = next_report(&r.events);
        assert_eq!(after.mode, Some(PowerMode::Automatic));
        assert!(after.verdict.is_none());
        assert_eq!(
            r.shell.sudo_calls(),
            vec!["sudo -n pmset -b lowpowermode 1", "sudo -n pmset -b lowpowermode 0"]
        );
        assert!(r.events.try_recv().is_err());
        r.stop();
    }

    #[test]
    fn test_info_commands_open_dialogs_without_ticking() {
        let r = rig(configured(), true);
        next_report(&r.events);
        assert_eq!(r.alerts.recv_timeout(WAIT).unwrap(), LAUNCH_TITLE);
        r.commands.send(Command::ShowAbout).unwrap();
        assert_eq!(r.alerts.recv_timeout(WAIT).unwrap(), APP_NAME);
        r.commands.send(Command::ShowAnalytics).unwrap();
        assert_eq!(r.alerts.recv_timeout(WAIT).unwrap(), "Battery Analytics");
        assert!(r.events.try_recv().is_err());
        r.stop();
    }

    #[test]
    fn test_first_check_waits_for_setup_answer() {
        let (answer, answer_after) = unbounded();
        let config = SaverConfig {
            check_interval: 3600,
            ..SaverConfig::default()
        };
        let r = rig_with(config, FakeShell::at(10), true, Some(answer_after));

        thread::sleep(Duration::from_millis(200));
        assert!(r.shell.calls().is_empty());
        assert!(r.events.try_recv().is_err());

        answer.send(()).unwrap();
        let report = next_report(&r.events);
        assert!(report.config.setup_complete);
        assert_eq!(r.alerts.recv_timeout(WAIT).unwrap(), "Setup Complete");
        assert_eq!(
            r.shell.calls().first().map(String::as_str),
            Some("stat -f %Su /dev/console")
        );
        r.stop();
    }

    #[test]
    fn test_declining_setup_quits() {
        let r = rig(
            SaverConfig {
                check_interval: 3600,
                ..SaverConfig::default()
            },
            false,
        );
        let quit = r
            .events
            .iter()
            .find(|e| matches!(e, PollerEvent::Quit));
        assert!(quit.is_some());
        r.handle.join().unwrap();
        assert!(r.shell.calls().is_empty());
    }
}
