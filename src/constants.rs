// src/constants.rs

//! Names, defaults and limits used across the crate.

use std::time::Duration;

/// The name of the directory holding agentsh configuration (in ~/.config/).
pub const CONFIG_DIR_NAME: &str = "agentsh";

/// The name of the main configuration file (inside the config directory).
pub const CONFIG_FILENAME: &str = "agentsh.toml";

/// Environment variable that overrides the configuration file location.
pub const CONFIG_PATH_ENV: &str = "AGENTSH_CONFIG";

/// Default timeout for commands run through the CLI, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Bounded timeout for `$(...)` substitutions performed by the variable resolver.
pub const SUBSTITUTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How often a running child is polled for completion or cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for output readers after a child has been killed.
pub const READER_GRACE_PERIOD: Duration = Duration::from_millis(200);

/// Exit code reported for errors that carry no exit status of their own.
pub const GENERIC_FAILURE_CODE: i32 = 1;

/// Exit code the CLI uses when a command was interrupted (Ctrl+C).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Deepest nesting of shell function calls before a call fails.
pub const MAX_CALL_DEPTH: usize = 256;

/// Stack size of the thread a script is interpreted on. The tree walk
/// recurses once per nested construct.
pub const INTERPRETER_STACK_SIZE: usize = 32 * 1024 * 1024;
