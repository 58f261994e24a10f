// src/cli/mod.rs

//! The `agentsh` command line: top-level parsing, action dispatch and handlers.

use clap::Parser;
use std::path::PathBuf;

pub mod args;
pub mod dispatcher;
pub mod handlers;

/// agentsh: a persistent, policy-guarded shell for coding agents.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    after_help = "Actions:\n  exec      Run one command and exit with its status\n  session   Read commands from stdin into one persistent shell\n  resolve   Expand $VAR, ${VAR} and $(command) in values\n  check     Show which simple commands the block policy refuses\n  classify  Show which interpreter would run a command",
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// Config file to use instead of ~/.config/agentsh/agentsh.toml.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The action followed by its own arguments.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
