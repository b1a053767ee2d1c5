//! Structured logging setup for the daemon.
//!
//! The daemon's own spans run at the level picked on the command line while
//! dependency noise stays at `info`; a `RUST_LOG` directive overrides both.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

use crate::errors::{Error, Result};

static LOGGING_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Install the global subscriber. Safe to call more than once; only the
/// first call takes effect.
pub fn init_logging(level: &str, json_output: bool) -> Result<()> {
    LOGGING_INITIALIZED
        .get_or_try_init(|| install_subscriber(level, json_output))
        .map(|_| ())
}

fn install_subscriber(level: &str, json_output: bool) -> Result<()> {
    let filter = env_filter(level)?;
    let result = if json_output {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init()
    };
    result.map_err(|e| Error::config(format!("Failed to install logging subscriber: {}", e)))
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    let directives = format!("info,{}={}", env!("CARGO_PKG_NAME"), level);
    let filter = EnvFilter::try_new(&directives)
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", level, e)))?;

    // An explicit RUST_LOG wins over the command-line level.
    Ok(EnvFilter::try_from_default_env().unwrap_or(filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_accepts_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(env_filter(level).is_ok(), "level = {level}");
        }
    }

    #[test]
    fn test_env_filter_rejects_garbage() {
        assert!(env_filter("very loud").is_err());
    }

    #[test]
    fn test_init_logging_idempotent() {
        // Whichever call wins the OnceCell, repeats must not panic and must
        // report the cached outcome.
        let first = init_logging("info", false);
        let second = init_logging("debug", true);
        assert_eq!(first.is_ok(), second.is_ok());
    }
}
