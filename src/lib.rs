//! # Swarmgate
//!
//! Swarmgate is a secret synchronization daemon that bridges external secret
//! stores (HashiCorp Vault, OpenBao, AWS Secrets Manager, Azure Key Vault,
//! GCP Secret Manager) with Docker Swarm's native secrets. It runs as a Docker
//! *secret driver* plugin: Swarm asks the daemon for a secret's bytes on
//! demand, and a background rotation loop watches the backends and atomically
//! swaps Swarm secret objects when upstream values change.
//!
//! ## Architecture
//!
//! ```text
//! Plugin Socket (Unix) → Fetch Driver → Provider Adapter → Secret Backend
//!                            ↓               ↑
//!                     Tracking Registry ← Rotation Engine → Docker Engine API
//! ```
//!
//! ## Core Components
//!
//! - **Provider Adapters**: one adapter per backend behind the
//!   [`providers::SecretsProvider`] trait (fetch, change detection, locator
//!   derivation, field extraction)
//! - **Fetch Driver**: serves synchronous secret requests from Swarm and
//!   records consumers in the tracking registry
//! - **Rotation Engine**: periodic change scan that creates a replacement
//!   Swarm secret, rewires every consuming service, and retires the old object

pub mod api;
pub mod cli;
pub mod config;
pub mod driver;
pub mod errors;
pub mod observability;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod rotation;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "swarmgate");
    }
}
