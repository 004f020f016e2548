//! `convlab` library crate.
//!
//! Re-exports the command-line surface for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod args;
pub mod commands;
pub mod config;
pub mod history;
