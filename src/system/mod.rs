//! # System Interaction Layer
//!
//! The boundary between the shell engine and the operating system.
//!
//! ## Modules
//!
//! - **`process`**: spawns a child with captured output and a null stdin, polls
//!   it for completion or cancellation, and kills its whole process tree when
//!   the context ends.
//! - **`posix`**: runs parsed scripts in the embedded interpreter on a
//!   large-stack thread and captures the working directory and environment
//!   they leave behind.
//! - **`native`**: the Windows path: an in-process `cd` and `cmd`/PowerShell
//!   wrappers that start in the persisted working directory.

pub mod native;
pub mod posix;
pub mod process;
