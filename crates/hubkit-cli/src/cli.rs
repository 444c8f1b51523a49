//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Boot a hub with demo extensions and send tracked events through the hit queue
    Demo {
        /// Number of track events to dispatch
        #[arg(short, long)]
        events: Option<usize>,
        /// Directory of the file-backed hit queue
        #[arg(short, long)]
        queue_dir: Option<PathBuf>,
        /// Number of initial hits the simulated server answers with 503
        #[arg(long, default_value_t = 0)]
        fail_first: usize,
    },
    /// Inspect or clear a hit queue directory
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// Show the number of queued hits and the head
    Inspect {
        /// Queue directory
        dir: PathBuf,
    },
    /// Remove every queued hit
    Clear {
        /// Queue directory
        dir: PathBuf,
    },
}
