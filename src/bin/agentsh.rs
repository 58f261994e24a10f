// src/bin/agentsh.rs

use agentsh::{
    CancellationToken,
    cli::{
        Cli,
        dispatcher::{self, AppContext},
        handlers::commons::{self, CliExit, InterruptAction},
    },
    constants::INTERRUPTED_EXIT_CODE,
    core::{config, shell::ShellError},
};
use anyhow::{Result, anyhow};
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The main entry point of the `agentsh` application.
/// It sets up logging and Ctrl+C handling, dispatches to the action handler,
/// and performs centralized error handling.
fn main() {
    env_logger::init();
    let cancellation_token: CancellationToken = Arc::new(AtomicBool::new(false));
    let busy = Arc::new(AtomicBool::new(false));
    spawn_interrupt_listener(Arc::clone(&cancellation_token), Arc::clone(&busy));

    if let Err(e) = run_cli(Cli::parse(), cancellation_token, busy) {
        // --- Centralized Error Handling ---
        if let Some(exit) = e.downcast_ref::<CliExit>() {
            std::process::exit(exit.code());
        }
        if let Some(shell_err) = e.downcast_ref::<ShellError>()
            && shell_err.is_interrupt()
        {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        // Help and version requests from action parsers.
        if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
            clap_err.exit();
        }

        eprintln!("\n{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Flips the token on Ctrl+C while a command runs, so the command is torn
/// down and its partial output still reported. With nothing running, Ctrl+C
/// ends agentsh with status 130.
fn spawn_interrupt_listener(token: CancellationToken, busy: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("Ctrl+C handling disabled: {}", e);
                return;
            }
        };
        runtime.block_on(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match commons::interrupt_action(&busy) {
                    InterruptAction::CancelCommand => {
                        log::debug!("Ctrl+C received, cancelling the running command.");
                        token.store(true, Ordering::SeqCst);
                    }
                    InterruptAction::Exit => {
                        log::debug!("Ctrl+C received with no command running, exiting.");
                        eprintln!();
                        std::process::exit(INTERRUPTED_EXIT_CODE);
                    }
                }
            }
        });
    });
}

fn run_cli(cli: Cli, cancellation_token: CancellationToken, busy: Arc<AtomicBool>) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let mut args = cli.args.into_iter();
    let action = args.next().ok_or_else(|| {
        anyhow!(
            "No action given. Available actions: {}",
            dispatcher::command_names().join(", ")
        )
    })?;

    let (config_path, config) = config::load_default(cli.config.as_deref())?;
    log::debug!("Loaded config from '{}'", config_path.display());

    let app = AppContext {
        config,
        config_path,
        token: cancellation_token,
        busy,
    };
    dispatcher::dispatch(&action, args.collect(), &app)
}
