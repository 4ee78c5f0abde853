//! # Footfall CLI
//!
//! Loads the foot traffic extracts, runs the site selection questions and
//! writes maps, tables and reports.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod pipeline;

pub use cli::{Cli, Command};
pub use config::{Config, LogFormat};
pub use pipeline::Pipeline;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
