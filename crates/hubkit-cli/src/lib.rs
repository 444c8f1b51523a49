//! hubkit CLI library
//!
//! Command definitions, configuration loading and the demo extensions used by
//! the `hubkit` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod demo;
pub mod error;

pub use cli::{Cli, Commands, QueueAction};
pub use commands::{clear_queue, inspect_queue, run_demo, CommandDispatcher, DemoSummary, QueueReport};
pub use config::{AppConfig, DemoConfig};
pub use error::{CliError, Result};
