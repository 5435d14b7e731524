//! One-time installation of a sudoers rule so `sudo -n pmset -b lowpowermode`
//! works without a password.

use tracing::{info, warn};

use crate::error::{Result, SaverError};
use crate::shell::{Shell, QUICK_TIMEOUT, SETUP_TIMEOUT};

pub const SUDOERS_FILE: &str = "/private/etc/sudoers.d/battery-saver";

/// User names go into a root shell command and a sudoers line, so only
/// letters, digits and `_ - .` pass.
fn is_safe(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// The console user: `$USER`, else the owner of /dev/console.
pub fn console_user<S: Shell>(shell: &S) -> Result<String> {
    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return Ok(user);
        }
    }
    let out = shell
        .run("stat", &["-f", "%Su", "/dev/console"], QUICK_TIMEOUT)?
        .checked("stat")?;
    Ok(out.stdout.trim().to_string())
}

pub fn sudoers_rule(user: &str) -> String {
    format!("{user} ALL=(ALL) NOPASSWD: /usr/bin/pmset -b lowpowermode *")
}

/// Shell command run as root: write the rule, lock its mode, validate it.
pub fn install_command(user: &str) -> Result<String> {
    if !is_safe(user) {
        return Err(SaverError::Permission(format!(
            "refusing to write a sudoers rule for user {user:?}"
        )));
    }
    Ok(format!(
        "mkdir -p /private/etc/sudoers.d && echo '{rule}' > {SUDOERS_FILE} && chmod 0440 {SUDOERS_FILE} && visudo -c -f {SUDOERS_FILE}",
        rule = sudoers_rule(user),
    ))
}

/// Install the rule behind an administrator prompt.
pub fn install_passwordless_pmset<S: Shell>(shell: &S) -> Result<()> {
    let user = console_user(shell)?;
    let command = install_command(&user)?;
    let script = format!(
        "do shell script \"{command}\" with administrator privileges with prompt \"Battery Saver needs your password to set up automatic Low Power Mode control.\""
    );

    let out = shell.run("osascript", &["-e", &script], SETUP_TIMEOUT)?;
    if out.success() {
        info!(user = %user, file = SUDOERS_FILE, "installed sudoers rule");
        Ok(())
    } else {
        warn!(stderr = %out.stderr.trim(), "sudoers setup failed");
        Err(SaverError::Permission(format!(
            "setup failed: {}",
            out.stderr.trim()
        )))
    }
}
