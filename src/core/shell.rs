// src/core/shell.rs

//! The persistent shell.
//!
//! A `Shell` behaves like one long-lived interactive shell: the working
//! directory and the environment left by one `exec` call are where the next
//! call starts. Every call holds the instance's mutex from start to finish,
//! including the final state sync, so concurrent callers are serialized and
//! always observe each other's committed state.

use crate::constants::GENERIC_FAILURE_CODE;
use crate::core::context::{ExecContext, InterruptCause};
use crate::core::dispatch::{self, Platform, Route};
use crate::core::handlers::{BlockPolicyHandler, HandlerChain};
use crate::core::policy::{BlockFunc, BlockPolicy};
use crate::core::syntax;
use crate::models::ExecResult;
use crate::system::native::{self, CdRequest, NativeShell};
use crate::system::posix::{self, PosixOutcome};
use crate::system::process::{ProcessError, ProcessOutcome};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use uuid::Uuid;

/// Every way an `exec` call can fail.
#[derive(Error, Debug)]
pub enum ShellError {
    /// The command text is not valid shell syntax. Nothing ran.
    #[error("Could not parse command: {message}")]
    Parse {
        /// The parser's description of the problem.
        message: String,
    },
    /// A block predicate refused a command; the script stopped there.
    #[error("command is not allowed for security reasons: {command}")]
    Blocked {
        /// Name of the refused command.
        command: String,
    },
    /// The command ran and exited non-zero.
    #[error("exit status {code}")]
    ExitStatus {
        /// The reported status.
        code: i32,
    },
    /// A process could not be started or waited for.
    #[error("Command '{command}' could not be executed: {source}")]
    Spawn {
        /// The program that failed.
        command: String,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },
    /// The context was cancelled or its deadline passed.
    #[error("{cause}")]
    Interrupted {
        /// Which of the two happened.
        cause: InterruptCause,
    },
    /// The shell itself could not be prepared.
    #[error("Shell setup failed: {message}")]
    Setup {
        /// What went wrong.
        message: String,
    },
    /// A working directory that does not exist or is not a directory.
    #[error("Directory '{path}' does not exist or is not a directory.")]
    InvalidDirectory {
        /// The rejected path, as given.
        path: String,
    },
}

impl ShellError {
    /// True for cancellation and expired deadlines.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// The status the command reported, or 1 when it never got to report one.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ExitStatus { code } => *code,
            _ => GENERIC_FAILURE_CODE,
        }
    }
}

impl From<ProcessError> for ShellError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Spawn { command, source } | ProcessError::Wait { command, source } => {
                Self::Spawn { command, source }
            }
        }
    }
}

/// True iff the error comes from cancellation or an expired deadline.
pub fn is_interrupt(err: &ShellError) -> bool {
    err.is_interrupt()
}

/// 0 for no error, the reported status for a failed command, 1 otherwise.
pub fn exit_code(err: Option<&ShellError>) -> i32 {
    err.map_or(0, ShellError::exit_code)
}

/// Construction parameters for a `Shell`.
#[derive(Default)]
pub struct ShellOptions {
    /// Defaults to the process's current directory.
    pub working_dir: Option<PathBuf>,
    /// `KEY=VALUE` entries. Defaults to the host environment.
    pub env: Option<Vec<String>>,
    /// Predicates every command is checked against, in order.
    pub block_funcs: Vec<BlockFunc>,
}

impl std::fmt::Debug for ShellOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellOptions")
            .field("working_dir", &self.working_dir)
            .field("env", &self.env.as_ref().map(Vec::len))
            .field("block_funcs", &self.block_funcs.len())
            .finish()
    }
}

#[derive(Debug)]
struct ShellState {
    cwd: PathBuf,
    env: Vec<String>,
    policy: BlockPolicy,
    handlers: HandlerChain<i32>,
}

/// A persistent shell: one working directory and environment carried from
/// each `exec` call to the next.
#[derive(Debug)]
pub struct Shell {
    id: Uuid,
    platform: Platform,
    state: Mutex<ShellState>,
}

impl Shell {
    /// Creates a shell, checking the working directory first.
    pub fn new(options: ShellOptions) -> Result<Self, ShellError> {
        let cwd = match options.working_dir {
            Some(dir) => checked_directory(&dir)?,
            None => env::current_dir().map_err(|e| ShellError::Setup {
                message: format!("Could not determine the current directory: {}", e),
            })?,
        };
        let env = options
            .env
            .unwrap_or_else(|| env::vars().map(|(k, v)| format!("{}={}", k, v)).collect());
        let policy = BlockPolicy::new(options.block_funcs);
        let id = Uuid::new_v4();
        log::debug!(
            "[shell {}] created in '{}' with {} block predicate(s)",
            short_id(&id),
            cwd.display(),
            policy.len()
        );
        Ok(Self {
            id,
            platform: Platform::current(),
            state: Mutex::new(ShellState {
                cwd,
                env,
                handlers: HandlerChain::standard(policy.clone()),
                policy,
            }),
        })
    }

    /// Runs one command in a private shell that is discarded afterwards.
    pub fn run_once(
        ctx: &ExecContext,
        cwd: &Path,
        command: &str,
        options: ShellOptions,
    ) -> ExecResult {
        let options = ShellOptions {
            working_dir: Some(cwd.to_path_buf()),
            ..options
        };
        match Self::new(options) {
            Ok(shell) => shell.exec(ctx, command),
            Err(e) => ExecResult::rejected(e),
        }
    }

    /// This shell's unique id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Overrides the platform used for routing. Intended for tests.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ShellState> {
        // A panic in another caller cannot leave the state half-written:
        // it is only ever replaced wholesale.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The directory the next command starts in.
    pub fn working_dir(&self) -> PathBuf {
        self.lock().cwd.clone()
    }

    /// Changes the working directory after checking that it exists.
    /// Relative paths are taken from the current working directory.
    pub fn set_working_dir(&self, path: impl AsRef<Path>) -> Result<(), ShellError> {
        let mut state = self.lock();
        let raw = path.as_ref().to_string_lossy();
        let expanded = PathBuf::from(shellexpand::tilde(&raw).into_owned());
        let target = if expanded.is_absolute() {
            expanded
        } else {
            state.cwd.join(expanded)
        };
        state.cwd = checked_directory(&target)?;
        Ok(())
    }

    /// The environment the next command starts with.
    pub fn environment(&self) -> Vec<String> {
        self.lock().env.clone()
    }

    /// Sets `key` to `value`, keeping the entry's original position if it
    /// already exists.
    pub fn set_env(&self, key: &str, value: &str) {
        let mut state = self.lock();
        upsert_env(&mut state.env, key, value);
    }

    /// Replaces the block predicates used by subsequent calls.
    pub fn set_block_funcs(&self, funcs: Vec<BlockFunc>) {
        let mut state = self.lock();
        state.policy = BlockPolicy::new(funcs);
        state.handlers = HandlerChain::standard(state.policy.clone());
    }

    /// Runs `command` and returns its captured output.
    ///
    /// The call holds this shell's mutex until the new working directory and
    /// environment have been committed. Interrupted and unparsable commands
    /// leave both untouched.
    pub fn exec(&self, ctx: &ExecContext, command: &str) -> ExecResult {
        let mut state = self.lock();
        let id = short_id(&self.id);

        if command.trim().is_empty() {
            return ExecResult::default();
        }

        let route = dispatch::classify(self.platform, command);
        log::debug!("[shell {}] route={} cmd={:?}", id, route, command);
        match route {
            Route::Posix => exec_posix(&mut state, &id, ctx, command),
            Route::NativeCmd => exec_native(&mut state, &id, ctx, command, NativeShell::Cmd),
            Route::NativePowerShell => {
                exec_native(&mut state, &id, ctx, command, NativeShell::PowerShell)
            }
        }
    }
}

fn exec_posix(state: &mut ShellState, id: &str, ctx: &ExecContext, command: &str) -> ExecResult {
    let program = match syntax::parse(command) {
        Ok(program) => program,
        Err(e) => {
            return ExecResult::rejected(ShellError::Parse { message: e.message });
        }
    };

    let PosixOutcome {
        stdout,
        stderr,
        status,
        state: captured,
    } = posix::run_script(id, &program, &state.cwd, &state.env, state.handlers.clone(), ctx);

    if let Some(captured) = captured {
        log::debug!(
            "[shell {}] synced state: cwd='{}', {} variable(s)",
            id,
            captured.cwd.display(),
            captured.env.len()
        );
        state.cwd = captured.cwd;
        state.env = captured.env;
    }
    let error = match status {
        Ok(0) => None,
        Ok(code) => Some(ShellError::ExitStatus { code }),
        Err(e) => Some(e),
    };
    ExecResult::new(stdout, stderr, error)
}

fn exec_native(
    state: &mut ShellState,
    id: &str,
    ctx: &ExecContext,
    command: &str,
    shell: NativeShell,
) -> ExecResult {
    if let Some(cause) = ctx.interrupt() {
        return ExecResult::rejected(ShellError::Interrupted { cause });
    }

    // A native shell runs the whole line at once, so every chained command is
    // judged before anything starts.
    let handler = BlockPolicyHandler::new(state.policy.clone());
    for argv in native::split_commands(command, shell) {
        log::trace!("[shell {}] native argv: {:?}", id, argv);
        if let Err(e) = handler.check(&argv) {
            return ExecResult::rejected(e);
        }
    }

    if shell == NativeShell::Cmd
        && let Some(request) = native::parse_cd(command)
    {
        return match request {
            CdRequest::Print => {
                ExecResult::new(format!("{}\n", state.cwd.display()), String::new(), None)
            }
            CdRequest::Change(target) => match native::resolve_cd_target(&state.cwd, &target) {
                Some(dir) => {
                    log::debug!("[shell {}] cd -> '{}'", id, dir.display());
                    upsert_env(&mut state.env, "PWD", &dir.to_string_lossy());
                    state.cwd = dir;
                    ExecResult::default()
                }
                None => ExecResult::new(
                    String::new(),
                    "The system cannot find the path specified.\n".to_string(),
                    Some(ShellError::InvalidDirectory { path: target }),
                ),
            },
        };
    }

    match native::run(shell, command, &state.cwd, &state.env, ctx) {
        Ok(outcome) => into_exec_result(outcome),
        Err(e) => ExecResult::rejected(e.into()),
    }
}

fn into_exec_result(outcome: ProcessOutcome) -> ExecResult {
    let error = match (outcome.interrupted, outcome.code) {
        (Some(cause), _) => Some(ShellError::Interrupted { cause }),
        (None, Some(0)) => None,
        (None, Some(code)) => Some(ShellError::ExitStatus { code }),
        (None, None) => Some(ShellError::ExitStatus {
            code: GENERIC_FAILURE_CODE,
        }),
    };
    ExecResult::new(outcome.stdout, outcome.stderr, error)
}

fn checked_directory(path: &Path) -> Result<PathBuf, ShellError> {
    let invalid = || ShellError::InvalidDirectory {
        path: path.display().to_string(),
    };
    let canonical = dunce::canonicalize(path).map_err(|_| invalid())?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(invalid())
    }
}

fn upsert_env(env: &mut Vec<String>, key: &str, value: &str) {
    let entry = format!("{}={}", key, value);
    let existing = env
        .iter()
        .position(|e| e.split_once('=').is_some_and(|(k, _)| k == key));
    match existing.and_then(|index| env.get_mut(index)) {
        Some(slot) => *slot = entry,
        None => env.push(entry),
    }
}

fn short_id(id: &Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::command_blocker;

    fn shell_in(dir: &Path) -> Shell {
        Shell::new(ShellOptions {
            working_dir: Some(dir.to_path_buf()),
            env: Some(vec!["A=1".into(), "B=2".into(), "C=3".into()]),
            ..ShellOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn test_exit_code_classification() {
        assert_eq!(exit_code(None), 0);
        assert_eq!(exit_code(Some(&ShellError::ExitStatus { code: 42 })), 42);
        assert_eq!(
            exit_code(Some(&ShellError::Parse {
                message: "bad".into()
            })),
            1
        );
        assert_eq!(
            exit_code(Some(&ShellError::Interrupted {
                cause: InterruptCause::Cancelled
            })),
            1
        );
    }

    #[test]
    fn test_is_interrupt_only_for_cancellation_and_deadline() {
        assert!(is_interrupt(&ShellError::Interrupted {
            cause: InterruptCause::DeadlineExceeded
        }));
        assert!(!is_interrupt(&ShellError::ExitStatus { code: 130 }));
        assert!(!is_interrupt(&ShellError::Blocked {
            command: "curl".into()
        }));
    }

    #[test]
    fn test_blocked_message_reads_as_security_refusal() {
        let err = ShellError::Blocked {
            command: "sudo".into(),
        };
        assert_eq!(
            err.to_string(),
            "command is not allowed for security reasons: sudo"
        );
    }

    #[test]
    fn test_set_env_preserves_first_position() {
        let dir = tempfile::tempdir().unwrap();
        let shell = shell_in(dir.path());
        shell.set_env("B", "20");
        shell.set_env("D", "4");
        shell.set_env("B", "200");
        assert_eq!(
            shell.environment(),
            vec!["A=1", "B=200", "C=3", "D=4"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_set_working_dir_validates_before_committing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let shell = shell_in(dir.path());
        let before = shell.working_dir();

        let err = shell.set_working_dir(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ShellError::InvalidDirectory { .. }));
        assert_eq!(shell.working_dir(), before);

        shell.set_working_dir("sub").unwrap();
        assert_eq!(shell.working_dir(), before.join("sub"));
    }

    #[test]
    fn test_new_rejects_missing_directory() {
        let result = Shell::new(ShellOptions {
            working_dir: Some(PathBuf::from("/definitely/not/here")),
            ..ShellOptions::default()
        });
        assert!(matches!(result, Err(ShellError::InvalidDirectory { .. })));
    }

    #[test]
    fn test_parse_error_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let shell = shell_in(dir.path()).with_platform(Platform::Posix);
        let env_before = shell.environment();

        let result = shell.exec(&ExecContext::background(), "cd / && echo 'unterminated");
        assert!(matches!(result.error, Some(ShellError::Parse { .. })));
        assert_eq!(result.exit_code(), 1);
        assert_eq!(shell.environment(), env_before);
    }

    fn guarded_shell(dir: &Path, blocked: &[&'static str], platform: Platform) -> Shell {
        Shell::new(ShellOptions {
            working_dir: Some(dir.to_path_buf()),
            env: Some(vec![format!("PATH={}", env::var("PATH").unwrap_or_default())]),
            block_funcs: vec![command_blocker(blocked.iter().copied())],
        })
        .unwrap()
        .with_platform(platform)
    }

    #[cfg(unix)]
    #[test]
    fn test_blocked_command_stops_the_script_where_it_stands() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let shell = guarded_shell(dir.path(), &["curl"], Platform::Posix);

        // --- Execution ---
        let result = shell.exec(
            &ExecContext::background(),
            "touch before && curl example.com; touch after",
        );

        // --- Assertions ---
        assert!(matches!(result.error, Some(ShellError::Blocked { .. })));
        assert!(dir.path().join("before").exists());
        assert!(!dir.path().join("after").exists());
    }

    #[test]
    fn test_set_block_funcs_applies_to_next_exec() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let shell = shell_in(dir.path());
        let ctx = ExecContext::background();
        assert!(shell.exec(&ctx, "echo first").success());

        // --- Execution ---
        shell.set_block_funcs(vec![command_blocker(["echo"])]);
        let result = shell.exec(&ctx, "echo second");

        // --- Assertions ---
        assert!(matches!(result.error, Some(ShellError::Blocked { .. })));
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn test_native_chain_is_checked_segment_by_segment() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let shell = guarded_shell(dir.path(), &["curl"], Platform::Windows);
        let ctx = ExecContext::background();

        // --- Assertions ---
        for command in [
            "dir & curl http://evil",
            "dir && curl http://evil",
            "dir | curl http://evil",
            "dir || curl http://evil",
            "dir ; curl http://evil",
            "dir & C:\\Tools\\curl.exe http://evil",
        ] {
            let result = shell.exec(&ctx, command);
            match result.error {
                Some(ShellError::Blocked { command: name }) => assert_eq!(name, "curl"),
                other => panic!("{} was not blocked: {:?}", command, other),
            }
        }
    }

    #[test]
    fn test_native_cd_is_handled_in_process() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("child")).unwrap();
        let shell = shell_in(dir.path()).with_platform(Platform::Windows);
        let base = shell.working_dir();
        let ctx = ExecContext::background();

        let result = shell.exec(&ctx, "cd child");
        assert!(result.success());
        assert_eq!(shell.working_dir(), base.join("child"));

        let result = shell.exec(&ctx, "cd");
        assert_eq!(result.stdout.trim_end(), base.join("child").display().to_string());

        let result = shell.exec(&ctx, "cd ..");
        assert!(result.success());
        assert_eq!(shell.working_dir(), base);

        let result = shell.exec(&ctx, "cd nope");
        assert!(matches!(result.error, Some(ShellError::InvalidDirectory { .. })));
        assert_eq!(shell.working_dir(), base);
    }

    #[test]
    fn test_empty_command_succeeds_without_running() {
        let dir = tempfile::tempdir().unwrap();
        let shell = shell_in(dir.path());
        let result = shell.exec(&ExecContext::background(), "   ");
        assert!(result.success());
        assert!(result.stdout.is_empty());
    }
}
