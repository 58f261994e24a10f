// src/cli/handlers/mod.rs

//! One module per CLI action.

pub mod check;
pub mod classify;
pub mod commons;
pub mod exec;
pub mod resolve;
pub mod session;
