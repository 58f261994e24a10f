// src/cli/handlers/classify.rs

//! `classify`: print the route a command would take.

use crate::cli::args::ClassifyArgs;
use crate::cli::dispatcher::AppContext;
use crate::core::dispatch::{self, Platform};
use anyhow::Result;
use clap::Parser;

/// Parses the arguments and prints the route.
pub fn handle(args: Vec<String>, _app: &AppContext) -> Result<()> {
    let classify_args = ClassifyArgs::try_parse_from(&args)?;
    let platform = classify_args.platform.unwrap_or_else(Platform::current);
    let command = classify_args.command.join(" ");
    println!("{}", dispatch::classify(platform, &command));
    Ok(())
}
