// src/cli/handlers/session.rs

//! `session`: read commands line by line into one persistent shell.

use crate::cli::args::SessionArgs;
use crate::cli::dispatcher::AppContext;
use crate::cli::handlers::commons;
use crate::core::shell::{Shell, ShellOptions};
use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::io::{BufRead, IsTerminal, Write};

/// Main entry point for the 'session' action.
///
/// Every line read from stdin runs in the same shell, so `cd` and `export`
/// carry over to the next line. `exit`, end of input or Ctrl+C at the prompt
/// ends the session.
pub fn handle(args: Vec<String>, app: &AppContext) -> Result<()> {
    let session_args = SessionArgs::try_parse_from(&args)?;
    let cwd = commons::working_dir(session_args.cwd)?;
    let timeout = commons::effective_timeout(session_args.timeout, app);
    let shell = Shell::new(ShellOptions {
        working_dir: Some(cwd),
        ..app.config.shell_options(None)
    })?;

    let interactive = std::io::stdin().is_terminal();
    if interactive {
        println!(
            "{} {} (type 'exit' to quit)",
            "agentsh session".bold(),
            shell.id().to_string().dimmed()
        );
    }

    let mut last_code = 0;
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("{} $ ", shell.working_dir().display().to_string().cyan());
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let trimmed = line.trim();
        if trimmed == "exit" {
            break;
        }
        if trimmed.is_empty() {
            continue;
        }

        let running = commons::begin_command(app);
        let ctx = commons::exec_context(app, timeout);
        let result = shell.exec(&ctx, &line);
        drop(running);
        commons::echo_output(&result)?;
        last_code = result.exit_code();
        if let Some(error) = &result.error {
            eprintln!("{}", error.to_string().red());
        }
    }

    log::debug!("Session {} ended with status {}", shell.id(), last_code);
    match last_code {
        0 => Ok(()),
        code => Err(commons::CliExit::Status(code).into()),
    }
}
