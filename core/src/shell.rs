//! The seam between battery logic and the external helper programs
//! (`pmset`, `sudo`, `osascript`, `system_profiler`, `stat`).

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, SaverError};

/// Budget for quick, non-interactive calls such as `pmset -g batt`.
pub const QUICK_TIMEOUT: Duration = Duration::from_secs(5);
/// Budget for anything that shows an administrator password prompt.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(30);
/// `system_profiler` walks IOKit and is slow on some machines.
pub const PROFILER_TIMEOUT: Duration = Duration::from_secs(10);
/// One-time sudoers installation, which includes a password prompt.
pub const SETUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Modal dialogs wait on the user, so they get a generous bound.
pub const DIALOG_TIMEOUT: Duration = Duration::from_secs(3600);

const POLL_STEP: Duration = Duration::from_millis(20);

/// Captured result of a finished helper program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into a `SaverError::Command` carrying stderr.
    pub fn checked(self, program: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(SaverError::Command(format!(
                "{program} exited with {}: {}",
                self.code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                self.stderr.trim()
            )))
        }
    }
}

/// Runs external programs. Implemented by [`SystemShell`] for real use and by
/// scripted fakes in tests.
pub trait Shell: Send + Sync {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput>;
}

impl<T: Shell + ?Sized> Shell for &T {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        (**self).run(program, args, timeout)
    }
}

impl<T: Shell + ?Sized> Shell for std::sync::Arc<T> {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        (**self).run(program, args, timeout)
    }
}

/// Spawns real processes with `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl Shell for SystemShell {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        debug!(program, ?args, "spawning");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SaverError::Command(format!("failed to start {program}: {e}")))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SaverError::Timeout {
                    program: program.to_string(),
                    after: timeout,
                });
            }
            thread::sleep(POLL_STEP);
        };

        let collect = |handle: Option<JoinHandle<String>>| {
            handle.and_then(|h| h.join().ok()).unwrap_or_default()
        };

        Ok(CommandOutput {
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}
