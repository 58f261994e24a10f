// src/core/resolver.rs

//! Resolution of shell-like configuration values (`$VAR`, `${VAR}`,
//! `$(command)`), used to keep secrets out of config files.

use crate::constants::SUBSTITUTION_TIMEOUT;
use crate::core::context::ExecContext;
use crate::core::shell::{Shell, ShellError, ShellOptions};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a value could not be resolved. Positions count characters from 0.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A `$` at the end of the value.
    #[error("'$' at position {position} is not followed by a variable name or command")]
    LoneDollar {
        /// Where the `$` is.
        position: usize,
    },
    /// A `$` followed by something that cannot start a name.
    #[error("invalid character '{character}' after '$' at position {position}")]
    InvalidVariableStart {
        /// The offending character.
        character: char,
        /// Where it is.
        position: usize,
    },
    /// A `$(` with no matching `)`.
    #[error("unmatched '$(' at position {position}")]
    UnmatchedParen {
        /// Where the `$` is.
        position: usize,
    },
    /// A `${` with no `}`.
    #[error("unmatched '${{' at position {position}")]
    UnmatchedBrace {
        /// Where the `$` is.
        position: usize,
    },
    /// The variable is missing or empty.
    #[error("environment variable '{name}' not set")]
    UnsetVariable {
        /// The variable's name.
        name: String,
    },
    /// The substituted command could not run or exited non-zero.
    #[error("command substitution '{command}' failed: {message}")]
    CommandFailed {
        /// The text between `$(` and `)`.
        command: String,
        /// The shell's error.
        message: String,
    },
}

/// Turns a raw configuration value into its final text.
pub trait VariableResolver: Send + Sync {
    /// Resolves every expression in `raw`.
    fn resolve_value(&self, raw: &str) -> Result<String, ResolveError>;
}

/// Where variable values come from.
pub trait EnvLookup: Send + Sync {
    /// The value of `name`, if it is set.
    fn get(&self, name: &str) -> Option<String>;
}

/// The host process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEnvironment;

impl EnvLookup for OsEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed set of variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    /// Builds the map from `KEY=VALUE` entries; later entries win.
    pub fn from_entries(entries: &[String]) -> Self {
        entries
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .collect()
    }

    /// Sets `name`, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Back to `KEY=VALUE` entries, sorted by key.
    pub fn entries(&self) -> Vec<String> {
        let sorted: BTreeMap<_, _> = self.vars.iter().collect();
        sorted
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvLookup for MapEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Looks a variable up; an empty value counts as unset.
fn lookup(env: &dyn EnvLookup, name: &str) -> Result<String, ResolveError> {
    env.get(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ResolveError::UnsetVariable {
            name: name.to_string(),
        })
}

/// Runs the text of a `$( ... )` substitution.
pub trait CommandRunner: Send + Sync {
    /// Returns the command's stdout, or an error if it did not succeed.
    fn run_command(&self, ctx: &ExecContext, command: &str) -> Result<String, ShellError>;
}

impl CommandRunner for Shell {
    fn run_command(&self, ctx: &ExecContext, command: &str) -> Result<String, ShellError> {
        self.exec(ctx, command).into_result().map(|output| output.stdout)
    }
}

/// Prefix-only environment lookup.
///
/// A value that does not start with `$` is returned unchanged; otherwise the
/// rest of it is taken verbatim as a variable name. Never runs commands and
/// never looks past the prefix. Kept for values written against the old
/// syntax; new values should go through `ShellVariableResolver`.
pub struct EnvironmentResolver {
    env: Arc<dyn EnvLookup>,
}

impl EnvironmentResolver {
    /// A resolver reading from `env`.
    pub fn new(env: Arc<dyn EnvLookup>) -> Self {
        Self { env }
    }
}

impl std::fmt::Debug for EnvironmentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentResolver").finish_non_exhaustive()
    }
}

impl VariableResolver for EnvironmentResolver {
    fn resolve_value(&self, raw: &str) -> Result<String, ResolveError> {
        match raw.strip_prefix('$') {
            Some(name) => lookup(self.env.as_ref(), name),
            None => Ok(raw.to_string()),
        }
    }
}

/// Expands every `$` expression anywhere in a value, running command
/// substitutions through a shell.
pub struct ShellVariableResolver {
    env: Arc<dyn EnvLookup>,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl std::fmt::Debug for ShellVariableResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellVariableResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ShellVariableResolver {
    /// A resolver owning a fresh shell whose environment mirrors `env`.
    pub fn new(env: MapEnvironment) -> Result<Self, ShellError> {
        let shell = Shell::new(ShellOptions {
            env: Some(env.entries()),
            ..ShellOptions::default()
        })?;
        Ok(Self::with_runner(Arc::new(env), Arc::new(shell)))
    }

    /// A resolver reading variables from `env` and running substitutions
    /// with `runner`.
    pub fn with_runner(env: Arc<dyn EnvLookup>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            env,
            runner,
            timeout: SUBSTITUTION_TIMEOUT,
        }
    }

    /// Overrides the per-substitution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn substitute(&self, command: &str) -> Result<String, ResolveError> {
        // Independent of any caller context, so a bad value cannot hang a load.
        let ctx = ExecContext::with_timeout(self.timeout);
        log::debug!("Resolving command substitution: {}", command);
        self.runner
            .run_command(&ctx, command)
            .map(|stdout| stdout.trim().to_string())
            .map_err(|e| ResolveError::CommandFailed {
                command: command.to_string(),
                message: e.to_string(),
            })
    }
}

impl VariableResolver for ShellVariableResolver {
    fn resolve_value(&self, raw: &str) -> Result<String, ResolveError> {
        if raw == "$" {
            return Err(ResolveError::LoneDollar { position: 0 });
        }

        let chars: Vec<char> = raw.chars().collect();
        let mut result = String::with_capacity(raw.len());
        let mut i = 0;
        while let Some(&c) = chars.get(i) {
            if c != '$' {
                result.push(c);
                i += 1;
                continue;
            }

            match chars.get(i + 1) {
                None => return Err(ResolveError::LoneDollar { position: i }),
                Some('(') => {
                    let end = matching_paren(&chars, i + 2)
                        .ok_or(ResolveError::UnmatchedParen { position: i })?;
                    let command = text_between(&chars, i + 2, end);
                    result.push_str(&self.substitute(&command)?);
                    i = end + 1;
                }
                Some('{') => {
                    let end = chars
                        .iter()
                        .enumerate()
                        .skip(i + 2)
                        .find_map(|(index, &c)| (c == '}').then_some(index))
                        .ok_or(ResolveError::UnmatchedBrace { position: i })?;
                    let name = text_between(&chars, i + 2, end);
                    result.push_str(&lookup(self.env.as_ref(), &name)?);
                    i = end + 1;
                }
                Some(&c) if c.is_ascii_alphabetic() || c == '_' => {
                    let end = chars
                        .iter()
                        .enumerate()
                        .skip(i + 1)
                        .find_map(|(index, &c)| {
                            (!c.is_ascii_alphanumeric() && c != '_').then_some(index)
                        })
                        .unwrap_or(chars.len());
                    let name = text_between(&chars, i + 1, end);
                    result.push_str(&lookup(self.env.as_ref(), &name)?);
                    i = end;
                }
                Some(&c) => {
                    return Err(ResolveError::InvalidVariableStart {
                        character: c,
                        position: i + 1,
                    });
                }
            }
        }
        Ok(result)
    }
}

fn text_between(chars: &[char], start: usize, end: usize) -> String {
    chars.get(start..end).unwrap_or_default().iter().collect()
}

/// Index of the `)` closing a `$(` whose body starts at `from`.
fn matching_paren(chars: &[char], from: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (offset, &c) in chars.iter().enumerate().skip(from) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// The outcome of resolving a batch of named values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolvedValues {
    /// Values that resolved, by name.
    pub values: BTreeMap<String, String>,
    /// Values that did not, with the reason.
    pub failures: BTreeMap<String, ResolveError>,
}

/// Resolves many named values in parallel.
///
/// A value that fails is logged and left out of `values`, so one bad field
/// never blocks the rest.
pub fn resolve_all<R>(resolver: &R, raw_values: &BTreeMap<String, String>) -> ResolvedValues
where
    R: VariableResolver + ?Sized,
{
    let results: Vec<(String, Result<String, ResolveError>)> = raw_values
        .par_iter()
        .map(|(key, raw)| (key.clone(), resolver.resolve_value(raw)))
        .collect();

    let mut resolved = ResolvedValues::default();
    for (key, result) in results {
        match result {
            Ok(value) => {
                resolved.values.insert(key, value);
            }
            Err(e) => {
                log::warn!("Skipping '{}': {}", key, e);
                resolved.failures.insert(key, e);
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_resolver_is_prefix_only() {
        let env: MapEnvironment = [("API_KEY", "sk-1")].into_iter().collect();
        let resolver = EnvironmentResolver::new(Arc::new(env));
        assert_eq!(resolver.resolve_value("$API_KEY").unwrap(), "sk-1");
        assert_eq!(resolver.resolve_value("plain").unwrap(), "plain");
        // Mid-string references are left alone.
        assert_eq!(
            resolver.resolve_value("Bearer $API_KEY").unwrap(),
            "Bearer $API_KEY"
        );
        assert_eq!(
            resolver.resolve_value("$MISSING"),
            Err(ResolveError::UnsetVariable {
                name: "MISSING".into()
            })
        );
    }

    #[test]
    fn test_map_environment_entries_round_trip() {
        let env = MapEnvironment::from_entries(&["B=2".into(), "A=1".into(), "A=3".into()]);
        assert_eq!(env.entries(), vec!["A=3".to_string(), "B=2".to_string()]);
        assert_eq!(env.get("A").as_deref(), Some("3"));
    }

    /// Counts its calls and echoes the command back.
    #[derive(Default)]
    struct CountingRunner(std::sync::atomic::AtomicUsize);

    impl CommandRunner for CountingRunner {
        fn run_command(&self, _: &ExecContext, command: &str) -> Result<String, ShellError> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(format!("ran:{}\n", command))
        }
    }

    fn resolver_with(vars: &[(&str, &str)]) -> (ShellVariableResolver, Arc<CountingRunner>) {
        let env: MapEnvironment = vars.iter().copied().collect();
        let runner = Arc::new(CountingRunner::default());
        let resolver = ShellVariableResolver::with_runner(Arc::new(env), runner.clone());
        (resolver, runner)
    }

    #[test]
    fn test_values_from_env_are_inserted_verbatim() {
        // --- Setup ---
        let (resolver, runner) = resolver_with(&[("TOKEN", "$(rm x)"), ("ALIAS", "$OTHER")]);

        // --- Assertions ---
        assert_eq!(resolver.resolve_value("$TOKEN").unwrap(), "$(rm x)");
        assert_eq!(resolver.resolve_value("k=${ALIAS}!").unwrap(), "k=$OTHER!");
        assert_eq!(runner.0.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_substitution_output_is_not_rescanned() {
        let (resolver, runner) = resolver_with(&[]);
        assert_eq!(resolver.resolve_value("a $(echo $HOME) b").unwrap(), "a ran:echo $HOME b");
        assert_eq!(runner.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dollar_before_punctuation_is_an_error() {
        let (resolver, _) = resolver_with(&[("b", "x")]);
        assert_eq!(
            resolver.resolve_value("a$#b"),
            Err(ResolveError::InvalidVariableStart {
                character: '#',
                position: 2
            })
        );
        assert_eq!(
            resolver.resolve_value("x$-"),
            Err(ResolveError::InvalidVariableStart {
                character: '-',
                position: 2
            })
        );
        assert_eq!(resolver.resolve_value("$"), Err(ResolveError::LoneDollar { position: 0 }));
        assert_eq!(resolver.resolve_value("x$"), Err(ResolveError::LoneDollar { position: 1 }));
        assert_eq!(
            resolver.resolve_value("${OPEN"),
            Err(ResolveError::UnmatchedBrace { position: 0 })
        );
    }

    #[test]
    fn test_matching_paren_tracks_depth() {
        let chars: Vec<char> = "$(a $(b) c) tail".chars().collect();
        assert_eq!(matching_paren(&chars, 2), Some(10));
        let chars: Vec<char> = "$(a $(b)".chars().collect();
        assert_eq!(matching_paren(&chars, 2), None);
    }
}
