//! # Core Logic
//!
//! Everything that decides *what* runs. The shell engine keeps state between
//! calls and hands POSIX scripts to the embedded interpreter, which passes
//! each command through the handler chain and its block policy. Route
//! classification and the config variable resolver live here too.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod handlers;
pub(crate) mod interp;
pub mod paths;
pub mod policy;
pub mod resolver;
pub mod shell;
pub mod syntax;
