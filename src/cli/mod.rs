//! CLI argument parsing and command dispatch.

pub mod args;
pub mod config;
pub mod policies;
pub mod serve;

pub use args::{Cli, Commands};
