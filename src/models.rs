// src/models.rs

//! Results handed back to callers and the `agentsh.toml` schema.

use crate::constants::{DEFAULT_TIMEOUT_SECS, SUBSTITUTION_TIMEOUT};
use crate::core::shell::{self, ShellError};
use serde::{Deserialize, Serialize};

// --- EXECUTION MODELS ---

/// The captured output of a command that ran to completion with status 0.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Everything the command wrote to standard output.
    pub stdout: String,
    /// Everything the command wrote to standard error.
    pub stderr: String,
}

/// The outcome of a single `Shell::exec` call.
///
/// Output is kept even when the command failed, so callers can show what the
/// command printed before it exited non-zero.
#[derive(Debug, Default)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// `None` exactly when the command ran and exited with status 0.
    pub error: Option<ShellError>,
}

impl ExecResult {
    /// Bundles captured output with the call's error, if any.
    pub fn new(stdout: String, stderr: String, error: Option<ShellError>) -> Self {
        Self {
            stdout,
            stderr,
            error,
        }
    }

    /// A result for a call that never got to run anything.
    pub fn rejected(error: ShellError) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error),
        }
    }

    /// See [`shell::exit_code`].
    pub fn exit_code(&self) -> i32 {
        shell::exit_code(self.error.as_ref())
    }

    /// True if the call was cancelled or ran out of time.
    pub fn is_interrupt(&self) -> bool {
        self.error.as_ref().is_some_and(shell::is_interrupt)
    }

    /// True if the command ran and exited with status 0.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Drops the output of failed runs and keeps only the error.
    pub fn into_result(self) -> Result<ExecOutput, ShellError> {
        match self.error {
            None => Ok(ExecOutput {
                stdout: self.stdout,
                stderr: self.stderr,
            }),
            Some(e) => Err(e),
        }
    }

    /// Builds the serializable view used by `agentsh exec --json`.
    pub fn report(&self) -> ExecReport {
        ExecReport {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            exit_code: self.exit_code(),
            interrupted: self.is_interrupt(),
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// JSON form of an [`ExecResult`].
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecReport {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// See [`ExecResult::exit_code`].
    pub exit_code: i32,
    /// See [`ExecResult::is_interrupt`].
    pub interrupted: bool,
    /// The error's message, if there was one.
    pub error: Option<String>,
}

// --- CONFIGURATION MODELS (agentsh.toml) ---

/// The whole `agentsh.toml` file.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// `[shell]`
    pub shell: ShellSection,
    /// `[policy]`
    pub policy: PolicySection,
    /// `[resolver]`
    pub resolver: ResolverSection,
}

/// Settings for command execution.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ShellSection {
    /// Timeout for `agentsh exec` and session lines. 0 disables it.
    pub default_timeout_secs: u64,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// The block policy.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PolicySection {
    /// Install the built-in deny lists before the user-defined ones.
    pub use_recommended: bool,
    /// Command names refused wherever they appear.
    pub banned_commands: Vec<String>,
    /// Argv prefixes refused, such as `["npm", "install", "-g"]`.
    pub banned_arguments: Vec<Vec<String>>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            use_recommended: true,
            banned_commands: Vec::new(),
            banned_arguments: Vec::new(),
        }
    }
}

/// Settings for resolving config values.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSection {
    /// Bound on each `$(...)` substitution, in seconds.
    pub substitution_timeout_secs: u64,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            substitution_timeout_secs: SUBSTITUTION_TIMEOUT.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_is_zero_only_without_error() {
        let ok = ExecResult::new("hi\n".into(), String::new(), None);
        assert_eq!(ok.exit_code(), 0);
        assert!(ok.success());

        let failed = ExecResult::new(
            String::new(),
            "boom".into(),
            Some(ShellError::ExitStatus { code: 3 }),
        );
        assert_eq!(failed.exit_code(), 3);
        assert!(!failed.success());
        assert!(!failed.is_interrupt());
    }

    #[test]
    fn test_report_carries_error_text() {
        let result = ExecResult::rejected(ShellError::Blocked {
            command: "curl".into(),
        });
        let report = result.report();
        assert_eq!(report.exit_code, 1);
        assert!(
            report
                .error
                .unwrap()
                .contains("not allowed for security reasons")
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [policy]
            banned_commands = ["curl"]
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.policy.use_recommended);
        assert_eq!(config.policy.banned_commands, vec!["curl".to_string()]);
        assert_eq!(config.shell.default_timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(
            config.resolver.substitution_timeout_secs,
            SUBSTITUTION_TIMEOUT.as_secs()
        );
    }

    #[test]
    fn test_unknown_config_field_is_rejected() {
        let toml_str = r#"
            [shell]
            default_timeout = 30 # Typo: should be `default_timeout_secs`
        "#;
        let result: Result<AppConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
        let error_msg = result.unwrap_err().to_string();
        assert!(
            error_msg.contains("unknown field `default_timeout`"),
            "Error message was: {}",
            error_msg
        );
    }
}
