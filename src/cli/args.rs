// src/cli/args.rs

//! Argument structs for each action, parsed after the action name.

use crate::core::dispatch::Platform;
use clap::Parser;
use std::path::PathBuf;

/// Arguments of `exec`.
#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Runs one command in a fresh shell and exits with its status."
)]
pub struct ExecArgs {
    /// Directory to run in. Defaults to the current directory.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Seconds before the command is killed. 0 disables the timeout.
    #[arg(long, short)]
    pub timeout: Option<u64>,

    /// Print stdout, stderr and the exit code as JSON.
    #[arg(long)]
    pub json: bool,

    /// The command text. Multiple words are joined with spaces.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Arguments of `session`.
#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Reads commands line by line into one persistent shell."
)]
pub struct SessionArgs {
    /// Directory the session starts in.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Per-command timeout in seconds. 0 disables it.
    #[arg(long, short)]
    pub timeout: Option<u64>,
}

/// Arguments of `resolve`.
#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Expands $VAR, ${VAR} and $(command) in configuration values."
)]
pub struct ResolveArgs {
    /// Only look variables up; never run command substitutions.
    #[arg(long)]
    pub env_only: bool,

    /// A TOML file whose top-level string values are resolved as a batch.
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// Print the results as JSON.
    #[arg(long)]
    pub json: bool,

    /// Values to resolve, one per argument.
    #[arg(allow_hyphen_values = true)]
    pub values: Vec<String>,
}

/// Arguments of `check`.
#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Dry-runs the block policy against a command without executing it."
)]
pub struct CheckArgs {
    /// The command text to check.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Arguments of `classify`.
#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Prints the route (posix, cmd or powershell) a command would take."
)]
pub struct ClassifyArgs {
    /// Classify as if running on this platform (posix or windows).
    #[arg(long)]
    pub platform: Option<Platform>,

    /// The command text to classify.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}
