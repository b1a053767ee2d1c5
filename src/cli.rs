//! # Command Line Interface
//!
//! The daemon is configured through the environment (see [`crate::config`]);
//! the CLI only carries knobs that are awkward as environment variables.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "swarmgate")]
#[command(about = "Secret synchronization daemon for Docker Swarm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Emit JSON-formatted logs
    #[arg(long)]
    pub json_logs: bool,

    /// Plugin socket path override
    #[arg(long)]
    pub socket: Option<PathBuf>,
}
