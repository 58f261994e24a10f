// src/system/posix.rs

//! Runs parsed scripts in the embedded interpreter and reads back the state
//! they leave behind.
//!
//! The interpreter gets the persisted environment and working directory, a
//! null stdin and two capture buffers. It runs on its own thread with a
//! large stack; the tree walk recurses once per nested construct and a
//! deeply nested script must not overflow the caller's stack.

use crate::constants::INTERPRETER_STACK_SIZE;
use crate::core::context::ExecContext;
use crate::core::handlers::HandlerChain;
use crate::core::interp::{In, Interpreter, Io, Out, io::SharedBuf};
use crate::core::shell::ShellError;
use brush_parser::ast;
use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use std::thread;

/// The working directory and environment left by a finished script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedState {
    /// The interpreter's final working directory.
    pub cwd: PathBuf,
    /// Every variable as a `KEY=VALUE` entry, in first-assignment order.
    pub env: Vec<String>,
}

/// Everything a script run produced.
#[derive(Debug)]
pub struct PosixOutcome {
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
    /// The script's exit status, or the error that stopped it.
    pub status: Result<i32, ShellError>,
    /// `None` when the run was interrupted; the caller keeps its old state.
    pub state: Option<CapturedState>,
}

fn drain(buffer: &SharedBuf) -> String {
    let bytes = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Runs `program` starting in `cwd` with `env`. Every command the script
/// dispatches goes through `handlers` first.
pub fn run_script(
    shell_id: &str,
    program: &ast::Program,
    cwd: &Path,
    env: &[String],
    handlers: HandlerChain<i32>,
    ctx: &ExecContext,
) -> PosixOutcome {
    let (stdout, out_buf) = Out::buffer();
    let (stderr, err_buf) = Out::buffer();
    let io = Io {
        stdin: In::Null,
        stdout,
        stderr,
    };

    let joined = thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name(format!("agentsh-{}", shell_id))
            .stack_size(INTERPRETER_STACK_SIZE)
            .spawn_scoped(scope, || {
                let mut interpreter =
                    Interpreter::new(shell_id, cwd, env, handlers, ctx.clone());
                let status = interpreter.run(program, &io);
                let state = CapturedState {
                    cwd: interpreter.cwd().to_path_buf(),
                    env: interpreter.env(),
                };
                (status, state)
            });
        match worker {
            Ok(handle) => handle.join().map_err(|_| ShellError::Setup {
                message: "the interpreter thread panicked".to_string(),
            }),
            Err(e) => Err(ShellError::Setup {
                message: format!("could not start the interpreter thread: {}", e),
            }),
        }
    });

    let (status, state) = match joined {
        Ok((status, state)) => {
            let interrupted = matches!(&status, Err(e) if e.is_interrupt());
            (status, (!interrupted).then_some(state))
        }
        Err(e) => (Err(e), None),
    };
    if state.is_none() {
        log::debug!("[shell {}] run did not finish; keeping the previous state", shell_id);
    }
    PosixOutcome {
        stdout: drain(&out_buf),
        stderr: drain(&err_buf),
        status,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{BlockPolicy, command_blocker};
    use crate::core::syntax;

    fn path_env() -> Vec<String> {
        vec![format!("PATH={}", std::env::var("PATH").unwrap_or_default())]
    }

    #[cfg(unix)]
    #[test]
    fn test_run_script_captures_output_and_state() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let target = dunce::canonicalize(dir.path()).unwrap();
        let script = format!(
            "cd {} && FOO=bar && echo hi && echo warn >&2",
            shlex::try_quote(&target.to_string_lossy()).unwrap()
        );
        let program = syntax::parse(&script).unwrap();

        // --- Execution ---
        let outcome = run_script(
            "test",
            &program,
            Path::new("/"),
            &path_env(),
            HandlerChain::default(),
            &ExecContext::background(),
        );

        // --- Assertions ---
        assert_eq!(outcome.stdout, "hi\n");
        assert_eq!(outcome.stderr, "warn\n");
        assert_eq!(outcome.status.unwrap(), 0);
        let state = outcome.state.unwrap();
        assert_eq!(state.cwd, target);
        assert!(state.env.contains(&"FOO=bar".to_string()));
    }

    #[test]
    fn test_exit_status_is_reported() {
        let program = syntax::parse("echo oops >&2; exit 4").unwrap();
        let outcome = run_script(
            "test",
            &program,
            Path::new("/"),
            &path_env(),
            HandlerChain::default(),
            &ExecContext::background(),
        );
        assert_eq!(outcome.status.unwrap(), 4);
        assert_eq!(outcome.stderr, "oops\n");
        assert!(outcome.state.is_some());
    }

    #[test]
    fn test_interrupted_run_captures_no_state() {
        let ctx = ExecContext::background();
        ctx.cancel();
        let program = syntax::parse("export LOST=1").unwrap();
        let outcome = run_script("test", &program, Path::new("/"), &[], HandlerChain::default(), &ctx);
        assert!(matches!(outcome.status, Err(ShellError::Interrupted { .. })));
        assert!(outcome.state.is_none());
    }

    #[test]
    fn test_blocked_run_keeps_state_of_earlier_commands() {
        let program = syntax::parse("export KEPT=1; curl example.com").unwrap();
        let handlers = HandlerChain::standard(BlockPolicy::new(vec![command_blocker(["curl"])]));
        let outcome = run_script(
            "test",
            &program,
            Path::new("/"),
            &path_env(),
            handlers,
            &ExecContext::background(),
        );
        assert!(matches!(outcome.status, Err(ShellError::Blocked { .. })));
        assert!(outcome.state.unwrap().env.contains(&"KEPT=1".to_string()));
    }
}
