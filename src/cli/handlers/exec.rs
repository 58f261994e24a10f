// src/cli/handlers/exec.rs

//! `exec`: run one command and exit with its status.

use crate::cli::args::ExecArgs;
use crate::cli::dispatcher::AppContext;
use crate::cli::handlers::commons::{self, CliExit};
use crate::core::shell::Shell;
use anyhow::Result;
use clap::Parser;

/// Main entry point for the 'exec' action.
/// Runs the command in a throwaway shell and mirrors its exit status.
pub fn handle(args: Vec<String>, app: &AppContext) -> Result<()> {
    let exec_args = ExecArgs::try_parse_from(&args)?;
    let cwd = commons::working_dir(exec_args.cwd)?;
    let command = exec_args.command.join(" ");
    let timeout = commons::effective_timeout(exec_args.timeout, app);
    let ctx = commons::exec_context(app, timeout);

    log::debug!(
        "exec in '{}' (timeout: {:?}): {}",
        cwd.display(),
        timeout,
        command
    );
    let options = app.config.shell_options(None);
    let running = commons::begin_command(app);
    let result = Shell::run_once(&ctx, &cwd, &command, options);
    drop(running);

    if exec_args.json {
        println!("{}", serde_json::to_string_pretty(&result.report())?);
    } else {
        commons::echo_output(&result)?;
        if let Some(error) = &result.error
            && !error.is_interrupt()
            && !matches!(error, crate::core::shell::ShellError::ExitStatus { .. })
        {
            // Exit statuses speak for themselves; everything else gets a line.
            eprintln!("agentsh: {}", error);
        }
    }

    match CliExit::from_result(&result) {
        Some(exit) => Err(exit.into()),
        None => Ok(()),
    }
}
