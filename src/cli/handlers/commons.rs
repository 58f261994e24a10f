// src/cli/handlers/commons.rs

//! Helpers shared by several handlers.

use crate::cli::dispatcher::AppContext;
use crate::constants::INTERRUPTED_EXIT_CODE;
use crate::core::context::ExecContext;
use crate::models::ExecResult;
use scopeguard::ScopeGuard;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// A non-zero exit requested by a handler. `main` turns it into the process
/// exit code without printing anything else.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliExit {
    /// Exit with this status.
    #[error("exit status {0}")]
    Status(i32),
    /// Exit with the conventional Ctrl+C status.
    #[error("interrupted")]
    Interrupted,
}

impl CliExit {
    /// The process exit code.
    pub fn code(self) -> i32 {
        match self {
            Self::Status(code) => code,
            Self::Interrupted => INTERRUPTED_EXIT_CODE,
        }
    }

    /// The exit to report for a finished command, if it did not succeed.
    pub fn from_result(result: &ExecResult) -> Option<Self> {
        if result.is_interrupt() {
            Some(Self::Interrupted)
        } else if result.success() {
            None
        } else {
            Some(Self::Status(result.exit_code()))
        }
    }
}

/// `--timeout` wins over the config; 0 means no timeout at all.
pub fn effective_timeout(flag: Option<u64>, app: &AppContext) -> Option<Duration> {
    match flag {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => app.config.default_timeout(),
    }
}

/// A context sharing the process-wide Ctrl+C token, bounded by `timeout`.
pub fn exec_context(app: &AppContext, timeout: Option<Duration>) -> ExecContext {
    let ctx = ExecContext::from_token(app.token.clone());
    match timeout {
        Some(timeout) => ctx.child_with_timeout(timeout),
        None => ctx,
    }
}

/// What Ctrl+C should do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Cancel the command that is running.
    CancelCommand,
    /// Nothing is running: end agentsh.
    Exit,
}

/// Decides what a Ctrl+C means given the `busy` flag.
pub fn interrupt_action(busy: &AtomicBool) -> InterruptAction {
    if busy.load(Ordering::SeqCst) {
        InterruptAction::CancelCommand
    } else {
        InterruptAction::Exit
    }
}

/// Marks a command as running until the returned guard drops. An interrupt
/// left over from before is cleared first, so it cannot cancel this command.
pub fn begin_command(
    app: &AppContext,
) -> ScopeGuard<Arc<AtomicBool>, impl FnOnce(Arc<AtomicBool>)> {
    app.token.store(false, Ordering::SeqCst);
    app.busy.store(true, Ordering::SeqCst);
    scopeguard::guard(Arc::clone(&app.busy), |busy| {
        busy.store(false, Ordering::SeqCst);
    })
}

/// `--cwd`, with `~` and `$VAR` expanded, or the process directory.
pub fn working_dir(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match flag {
        Some(path) => Ok(crate::core::paths::expand_path(&path.to_string_lossy())?),
        None => Ok(std::env::current_dir()?),
    }
}

/// Writes the captured streams to our own stdout and stderr, unchanged.
pub fn echo_output(result: &ExecResult) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(result.stdout.as_bytes())?;
    stdout.flush()?;
    let mut stderr = std::io::stderr().lock();
    stderr.write_all(result.stderr.as_bytes())?;
    stderr.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shell::ShellError;
    use crate::models::AppConfig;

    fn app() -> AppContext {
        AppContext {
            config: AppConfig::default(),
            config_path: PathBuf::from("agentsh.toml"),
            token: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_stale_interrupt_is_cleared_before_next_command() {
        // --- Setup ---
        let app = app();
        // Ctrl+C pressed while nothing was running.
        app.token.store(true, Ordering::SeqCst);

        // --- Execution ---
        let running = begin_command(&app);
        let ctx = exec_context(&app, None);

        // --- Assertions ---
        assert!(!ctx.is_done());
        assert_eq!(interrupt_action(&app.busy), InterruptAction::CancelCommand);
        drop(running);
        assert_eq!(interrupt_action(&app.busy), InterruptAction::Exit);
    }

    #[test]
    fn test_timeout_flag_overrides_config() {
        let app = app();
        assert_eq!(effective_timeout(Some(0), &app), None);
        assert_eq!(
            effective_timeout(Some(3), &app),
            Some(Duration::from_secs(3))
        );
        assert_eq!(effective_timeout(None, &app), app.config.default_timeout());
    }

    #[test]
    fn test_cli_exit_from_result() {
        let ok = ExecResult::default();
        assert_eq!(CliExit::from_result(&ok), None);

        let failed = ExecResult::rejected(ShellError::ExitStatus { code: 4 });
        assert_eq!(CliExit::from_result(&failed), Some(CliExit::Status(4)));

        let interrupted = ExecResult::rejected(ShellError::Interrupted {
            cause: crate::core::context::InterruptCause::Cancelled,
        });
        assert_eq!(
            CliExit::from_result(&interrupted).map(CliExit::code),
            Some(INTERRUPTED_EXIT_CODE)
        );
    }
}
