//! # Configuration Management
//!
//! The daemon is configured entirely through a flat environment-variable map.
//! The full environment snapshot is also handed to the selected provider
//! adapter, which picks out the keys it needs (`VAULT_ADDR`, `AWS_REGION`,
//! `GCP_PROJECT_ID`, ...).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{Error, Result};
use crate::providers::ProviderKind;

/// Default socket Swarm uses to reach the plugin.
pub const DEFAULT_PLUGIN_SOCKET: &str = "/run/docker/plugins/plugin.sock";

/// Default pause between rotation scans.
const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(10);

/// Default deadline for a single provider call.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Daemon configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Which provider adapter to instantiate.
    pub provider: ProviderKind,
    /// Global switch for the rotation loop.
    pub enable_rotation: bool,
    /// Pause between rotation scans.
    pub rotation_interval: Duration,
    /// Deadline applied to every provider call.
    pub fetch_timeout: Duration,
    /// Unix socket the plugin protocol is served on.
    pub socket_path: PathBuf,
    /// Full environment snapshot, consumed by the provider adapter.
    pub settings: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Vault,
            enable_rotation: true,
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            socket_path: PathBuf::from(DEFAULT_PLUGIN_SOCKET),
            settings: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Create configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_settings(std::env::vars().collect())
    }

    /// Create configuration from an explicit settings map.
    pub fn from_settings(settings: HashMap<String, String>) -> Result<Self> {
        let provider = match settings.get("SECRETS_PROVIDER") {
            Some(value) => value.parse()?,
            None => ProviderKind::Vault,
        };

        let enable_rotation = settings
            .get("ENABLE_ROTATION")
            .map(|v| is_truthy(v))
            .unwrap_or(true);

        let rotation_interval =
            parse_duration_setting(&settings, "ROTATION_INTERVAL", DEFAULT_ROTATION_INTERVAL)?;
        let fetch_timeout =
            parse_duration_setting(&settings, "SECRETS_FETCH_TIMEOUT", DEFAULT_FETCH_TIMEOUT)?;

        let socket_path = settings
            .get("PLUGIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGIN_SOCKET));

        Ok(Self {
            provider,
            enable_rotation,
            rotation_interval,
            fetch_timeout,
            socket_path,
            settings,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true") || value.trim() == "1"
}

fn parse_duration_setting(
    settings: &HashMap<String, String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let Some(raw) = settings.get(key) else {
        return Ok(default);
    };
    let duration = humantime::parse_duration(raw.trim())
        .map_err(|e| Error::config(format!("Invalid {}: '{}': {}", key, raw, e)))?;
    if duration.is_zero() {
        return Err(Error::config(format!("Invalid {}: must be positive", key)));
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, ProviderKind::Vault);
        assert!(config.enable_rotation);
        assert_eq!(config.rotation_interval, Duration::from_secs(10));
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_PLUGIN_SOCKET));
    }

    #[test]
    fn test_from_settings_defaults() {
        let config = AppConfig::from_settings(HashMap::new()).unwrap();
        assert_eq!(config.provider, ProviderKind::Vault);
        assert!(config.enable_rotation);
        assert_eq!(config.rotation_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_from_settings_overrides() {
        let config = AppConfig::from_settings(settings(&[
            ("SECRETS_PROVIDER", "aws"),
            ("ENABLE_ROTATION", "false"),
            ("ROTATION_INTERVAL", "1m"),
            ("SECRETS_FETCH_TIMEOUT", "5s"),
            ("PLUGIN_SOCKET", "/tmp/test.sock"),
        ]))
        .unwrap();
        assert_eq!(config.provider, ProviderKind::Aws);
        assert!(!config.enable_rotation);
        assert_eq!(config.rotation_interval, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/test.sock"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = AppConfig::from_settings(settings(&[("SECRETS_PROVIDER", "consul")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let result = AppConfig::from_settings(settings(&[("ROTATION_INTERVAL", "soon")]));
        assert!(result.is_err());

        let result = AppConfig::from_settings(settings(&[("ROTATION_INTERVAL", "0s")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_rotation_switch_parsing() {
        for (raw, expected) in [("true", true), ("1", true), ("TRUE", true), ("false", false), ("no", false)] {
            let config =
                AppConfig::from_settings(settings(&[("ENABLE_ROTATION", raw)])).unwrap();
            assert_eq!(config.enable_rotation, expected, "raw = {raw}");
        }
    }

    #[test]
    fn test_settings_snapshot_preserved() {
        let config = AppConfig::from_settings(settings(&[
            ("SECRETS_PROVIDER", "vault"),
            ("VAULT_ADDR", "http://127.0.0.1:8200"),
        ]))
        .unwrap();
        assert_eq!(
            config.settings.get("VAULT_ADDR").map(String::as_str),
            Some("http://127.0.0.1:8200")
        );
    }
}
