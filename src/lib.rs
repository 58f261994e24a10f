//! A persistent, policy-guarded shell execution core for coding agents.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag that, once set, cancels every context holding it.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;

pub use crate::core::context::{ExecContext, InterruptCause};
pub use crate::core::dispatch::{Platform, Route, classify};
pub use crate::core::policy::{BlockFunc, BlockPolicy, argument_blocker, command_blocker};
pub use crate::core::resolver::{
    CommandRunner, EnvLookup, EnvironmentResolver, MapEnvironment, OsEnvironment, ResolveError,
    ResolvedValues, ShellVariableResolver, VariableResolver, resolve_all,
};
pub use crate::core::shell::{Shell, ShellError, ShellOptions, exit_code, is_interrupt};
pub use crate::models::{ExecOutput, ExecResult};
