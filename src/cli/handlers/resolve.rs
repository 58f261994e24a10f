// src/cli/handlers/resolve.rs

//! `resolve`: expand config-style values.

use crate::cli::args::ResolveArgs;
use crate::cli::dispatcher::AppContext;
use crate::cli::handlers::commons::CliExit;
use crate::core::resolver::{self, EnvironmentResolver, OsEnvironment, VariableResolver};
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use colored::Colorize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Main entry point for the 'resolve' action.
///
/// Values come from the command line (keyed by position) and from the
/// top-level strings of `--file`. All of them are resolved as one batch.
pub fn handle(args: Vec<String>, app: &AppContext) -> Result<()> {
    let resolve_args = ResolveArgs::try_parse_from(&args)?;

    let mut raw_values = BTreeMap::new();
    if let Some(path) = &resolve_args.file {
        raw_values.extend(read_value_file(path)?);
    }
    for (index, value) in resolve_args.values.iter().enumerate() {
        raw_values.insert(format!("arg{}", index), value.clone());
    }
    if raw_values.is_empty() {
        return Err(anyhow!("Nothing to resolve. Pass values or --file <PATH>."));
    }

    let resolver: Box<dyn VariableResolver> = if resolve_args.env_only {
        Box::new(EnvironmentResolver::new(Arc::new(OsEnvironment)))
    } else {
        Box::new(app.config.variable_resolver()?)
    };
    let resolved = resolver::resolve_all(resolver.as_ref(), &raw_values);

    if resolve_args.json {
        let failures: BTreeMap<&String, String> = resolved
            .failures
            .iter()
            .map(|(key, e)| (key, e.to_string()))
            .collect();
        let report = serde_json::json!({
            "values": resolved.values,
            "failures": failures,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (key, value) in &resolved.values {
            println!("{} = {}", key.cyan(), value);
        }
        for (key, e) in &resolved.failures {
            eprintln!("{} {}: {}", "failed".red().bold(), key, e);
        }
    }

    if resolved.failures.is_empty() {
        Ok(())
    } else {
        Err(CliExit::Status(1).into())
    }
}

/// Top-level string values of a TOML file. Tables and other types are skipped.
fn read_value_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read '{}'", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Failed to parse '{}'", path.display()))?;
    Ok(table
        .into_iter()
        .filter_map(|(key, value)| match value {
            toml::Value::String(s) => Some((key, s)),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_value_file_keeps_only_strings() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let path = dir.path().join("values.toml");
        fs::write(
            &path,
            "api_key = \"$API_KEY\"\nretries = 3\n[nested]\nx = \"y\"\n",
        )
        .unwrap();

        // --- Action ---
        let values = read_value_file(&path).unwrap();

        // --- Assertions ---
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("api_key").map(String::as_str), Some("$API_KEY"));
    }
}
