// src/core/config.rs

//! Loading and saving `agentsh.toml`, and turning it into shell options.

use crate::core::paths::{self, PathError};
use crate::core::policy::BlockPolicy;
use crate::core::resolver::{MapEnvironment, ShellVariableResolver};
use crate::core::shell::{Shell, ShellError, ShellOptions};
use crate::models::AppConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Why the config file could not be loaded or saved.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    /// The config location could not be determined.
    #[error(transparent)]
    Path(#[from] PathError),
    /// The file is not valid TOML for this schema.
    #[error("Failed to parse '{path}': {source}")]
    TomlParse {
        /// The file that failed to parse.
        path: String,
        /// The parser's error.
        #[source]
        source: toml::de::Error,
    },
    /// The config could not be written as TOML.
    #[error("Failed to serialize config to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Loads the config file, writing the defaults first if it does not exist.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        log::debug!("No config at '{}', writing defaults.", path.display());
        let default_config = AppConfig::default();
        save_config(path, &default_config)?;
        return Ok(default_config);
    }
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

/// Resolves the config location (see `paths::get_config_path`) and loads it.
pub fn load_default(explicit: Option<&Path>) -> Result<(PathBuf, AppConfig), ConfigError> {
    let path = paths::get_config_path(explicit)?;
    let config = load_config(&path)?;
    Ok((path, config))
}

impl AppConfig {
    /// The policy described by `[policy]`.
    pub fn block_policy(&self) -> BlockPolicy {
        BlockPolicy::from_config(&self.policy)
    }

    /// The `[shell]` timeout, or `None` when it is 0.
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.shell.default_timeout_secs > 0)
            .then(|| Duration::from_secs(self.shell.default_timeout_secs))
    }

    /// Shell options carrying this config's policy.
    pub fn shell_options(&self, working_dir: Option<PathBuf>) -> ShellOptions {
        ShellOptions {
            working_dir,
            env: None,
            block_funcs: self.block_policy().into_funcs(),
        }
    }

    /// A shell-backed resolver over the host environment, honoring the
    /// configured substitution timeout.
    pub fn variable_resolver(&self) -> Result<ShellVariableResolver, ShellError> {
        let env: MapEnvironment = std::env::vars().collect();
        let shell = Shell::new(ShellOptions {
            env: Some(env.entries()),
            ..ShellOptions::default()
        })?;
        let resolver = ShellVariableResolver::with_runner(
            std::sync::Arc::new(env),
            std::sync::Arc::new(shell),
        );
        Ok(resolver.with_timeout(Duration::from_secs(
            self.resolver.substitution_timeout_secs.max(1),
        )))
    }
}
