// src/cli/dispatcher.rs

//! Maps action names to their handlers.

use crate::{CancellationToken, cli::handlers, models::AppConfig};
use anyhow::{Result, anyhow};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// What every handler gets besides its own arguments.
#[derive(Debug)]
pub struct AppContext {
    /// The loaded `agentsh.toml`.
    pub config: AppConfig,
    /// Where `config` was loaded from.
    pub config_path: PathBuf,
    /// Flipped by Ctrl+C while a command runs.
    pub token: CancellationToken,
    /// True while a command runs. Ctrl+C at any other time ends agentsh.
    pub busy: Arc<AtomicBool>,
}

/// Defines an action, its aliases and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &AppContext) -> Result<()>,
}

/// The single source of truth for all actions.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "exec",
        aliases: &["x"],
        handler: handlers::exec::handle,
    },
    CommandDefinition {
        name: "session",
        aliases: &["sh"],
        handler: handlers::session::handle,
    },
    CommandDefinition {
        name: "resolve",
        aliases: &[],
        handler: handlers::resolve::handle,
    },
    CommandDefinition {
        name: "check",
        aliases: &[],
        handler: handlers::check::handle,
    },
    CommandDefinition {
        name: "classify",
        aliases: &[],
        handler: handlers::classify::handle,
    },
];

fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Every action name, in registry order.
pub fn command_names() -> Vec<&'static str> {
    COMMAND_REGISTRY.iter().map(|cmd| cmd.name).collect()
}

/// Routes `action` to its handler.
pub fn dispatch(action: &str, args: Vec<String>, app: &AppContext) -> Result<()> {
    let command_def = find_command(action).ok_or_else(|| {
        anyhow!(
            "Unknown action '{}'. Available actions: {}",
            action.cyan(),
            command_names().join(", ")
        )
    })?;
    log::debug!("Dispatching '{}' with args {:?}", command_def.name, args);
    (command_def.handler)(args, app)
}
