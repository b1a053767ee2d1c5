//! Error types for the swarmgate daemon.

mod types;

pub use types::{Error, Result};
