//! Desktop notifications and modal dialogs through `osascript`.
//!
//! AppleScript avoids needing UNUserNotificationCenter entitlements for an
//! unbundled binary.

use tracing::warn;

use crate::error::Result;
use crate::shell::{Shell, DIALOG_TIMEOUT, QUICK_TIMEOUT};

/// Something that can tell the user what just happened.
pub trait Notifier: Send {
    fn notify(&self, title: &str, subtitle: Option<&str>, body: &str);
}

/// Strip characters that would break out of an AppleScript string literal.
pub(crate) fn sanitize(s: &str) -> String {
    s.replace('"', "'").replace('\\', "")
}

/// Posts notifications and dialogs with `osascript`.
#[derive(Debug, Clone)]
pub struct OsaNotifier<S> {
    shell: S,
}

impl<S: Shell> OsaNotifier<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    /// Show a modal dialog with a single OK button. Blocks until dismissed.
    pub fn alert(&self, title: &str, message: &str) -> Result<()> {
        let script = format!(
            "display dialog \"{}\" with title \"{}\" buttons {{\"OK\"}} default button \"OK\"",
            sanitize(message),
            sanitize(title),
        );
        self.shell
            .run("osascript", &["-e", &script], DIALOG_TIMEOUT)?
            .checked("osascript")?;
        Ok(())
    }

    /// Ask a yes/no question. Cancelling (or any failure) counts as "no".
    pub fn confirm(&self, title: &str, message: &str, ok: &str, cancel: &str) -> bool {
        let script = format!(
            "display dialog \"{}\" with title \"{}\" \
             buttons {{\"{}\", \"{}\"}} default button \"{}\" cancel button \"{}\"",
            sanitize(message),
            sanitize(title),
            sanitize(cancel),
            sanitize(ok),
            sanitize(ok),
            sanitize(cancel),
        );
        match self
            .shell
            .run("osascript", &["-e", &script], DIALOG_TIMEOUT)
        {
            Ok(out) => {
                out.success() && out.stdout.contains(&format!("button returned:{}", sanitize(ok)))
            }
            Err(e) => {
                warn!(error = %e, "confirmation dialog failed");
                false
            }
        }
    }
}

impl<S: Shell> Notifier for OsaNotifier<S> {
    fn notify(&self, title: &str, subtitle: Option<&str>, body: &str) {
        let subtitle_part = subtitle
            .map(|s| format!(" subtitle \"{}\"", sanitize(s)))
            .unwrap_or_default();

        let script = format!(
            "display notification \"{}\" with title \"{}\"{subtitle_part}",
            sanitize(body),
            sanitize(title),
        );

        match self.shell.run("osascript", &["-e", &script], QUICK_TIMEOUT) {
            Ok(out) if out.success() => {}
            Ok(out) => warn!(stderr = %out.stderr.trim(), "osascript notification failed"),
            Err(e) => warn!(error = %e, "failed to send notification"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::testing::ScriptedShell;

    #[test]
    fn test_sanitize_quotes_and_backslashes() {
        assert_eq!(sanitize(r#"say "hi" \now"#), "say 'hi' now");
    }

    #[test]
    fn test_notify_builds_script_with_subtitle() {
        let shell = ScriptedShell::new();
        shell.answer("osascript", 0, "");
        OsaNotifier::new(shell.clone()).notify(
            "Battery Saver",
            Some("Battery at 19%"),
            "Low Power Mode enabled",
        );
        let calls = shell.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("display notification \"Low Power Mode enabled\""));
        assert!(calls[0].contains("with title \"Battery Saver\" subtitle \"Battery at 19%\""));
    }

    #[test]
    fn test_confirm_reads_button() {
        let shell = ScriptedShell::new();
        shell.answer("osascript", 0, "button returned:Continue\n");
        let n = OsaNotifier::new(shell);
        assert!(n.confirm("Welcome", "Set up?", "Continue", "Quit"));
    }

    #[test]
    fn test_confirm_cancel_is_no() {
        let shell = ScriptedShell::new();
        shell.answer("osascript", 1, "");
        let n = OsaNotifier::new(shell);
        assert!(!n.confirm("Welcome", "Set up?", "Continue", "Quit"));
    }
}
