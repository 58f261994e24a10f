// src/core/paths.rs

//! Config directory lookup and `~`/`$VAR` expansion for user-supplied paths.

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILENAME, CONFIG_PATH_ENV};
use lazy_static::lazy_static;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Failures while locating the config directory or expanding a path.
#[derive(Error, Debug)]
pub enum PathError {
    /// The platform reports no config directory.
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    /// The directory exists nowhere and could not be created.
    #[error("Could not create config directory at '{path}': {source}")]
    ConfigDirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// `~` or a variable in the path could not be expanded.
    #[error("Failed to expand path '{template}': {message}")]
    Expansion { template: String, message: String },
}

/// Returns the agentsh configuration directory (`~/.config/agentsh`),
/// creating it if needed.
///
/// Memoized: the first call computes and caches the path.
pub fn get_config_dir() -> Result<PathBuf, PathError> {
    let mut cached = CONFIG_DIR
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(CONFIG_DIR_NAME);
    ensure_dir(&config_path)?;

    *cached = Some(config_path.clone());
    Ok(config_path)
}

fn ensure_dir(path: &Path) -> Result<(), PathError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| PathError::ConfigDirCreation {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

/// Where the config file lives: an explicit path wins, then `$AGENTSH_CONFIG`,
/// then `agentsh.toml` in the config directory.
pub fn get_config_path(explicit: Option<&Path>) -> Result<PathBuf, PathError> {
    if let Some(path) = explicit {
        return expand_path(&path.to_string_lossy());
    }
    if let Ok(from_env) = env::var(CONFIG_PATH_ENV)
        && !from_env.trim().is_empty()
    {
        return expand_path(&from_env);
    }
    get_config_dir().map(|dir| dir.join(CONFIG_FILENAME))
}

/// Expands `~` and `$VAR`/`${VAR}` in a path taken from the command line or
/// the config file.
pub fn expand_path(template: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(template).map_err(|e| PathError::Expansion {
        template: template.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_path_wins() {
        let path = get_config_path(Some(Path::new("/tmp/custom.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }

    #[test]
    fn test_expand_path_rejects_unknown_variables() {
        let result = expand_path("$AGENTSH_SURELY_UNDEFINED_VARIABLE/x");
        assert!(matches!(result, Err(PathError::Expansion { .. })));
    }

    #[test]
    fn test_expand_path_handles_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/agentsh").unwrap(), home.join("agentsh"));
        }
    }
}
