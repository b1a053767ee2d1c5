//! Secret store provider abstraction.
//!
//! Every backend is wrapped in an adapter implementing [`SecretsProvider`]:
//! locator derivation, fetch, change detection, and teardown. The shared
//! payload [`extract`] rules and [`naming`] sanitizers keep behavior uniform
//! across backends; only the wire calls differ per adapter.

pub mod aws;
pub mod azure;
pub mod extract;
pub mod gcp;
pub mod naming;
pub mod openbao;
pub mod vault;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::types::SecretRequest;
use crate::errors::{Error, Result};
use crate::registry::{fingerprint_hex, TrackedSecret};

/// Field sentinel meaning "whole payload" / default extraction.
pub const DEFAULT_FIELD: &str = "value";

/// Identifier of a secret store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// HashiCorp Vault KV
    Vault,
    /// OpenBao KV (Vault-compatible)
    OpenBao,
    /// AWS Secrets Manager
    Aws,
    /// Azure Key Vault
    Azure,
    /// GCP Secret Manager
    Gcp,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vault => "vault",
            Self::OpenBao => "openbao",
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
        }
    }

    /// Request label that overrides the backend locator for this provider.
    pub fn path_label(&self) -> &'static str {
        match self {
            Self::Vault => "vault_path",
            Self::OpenBao => "openbao_path",
            Self::Aws => "aws_secret_name",
            Self::Azure => "azure_secret_name",
            Self::Gcp => "gcp_secret_name",
        }
    }

    /// Request label selecting a JSON field from the payload.
    pub fn field_label(&self) -> &'static str {
        match self {
            Self::Vault => "vault_field",
            Self::OpenBao => "openbao_field",
            Self::Aws => "aws_field",
            Self::Azure => "azure_field",
            Self::Gcp => "gcp_field",
        }
    }

    /// Request label overriding the reuse policy.
    pub fn reuse_label(&self) -> &'static str {
        match self {
            Self::Vault => "vault_reuse",
            Self::OpenBao => "openbao_reuse",
            Self::Aws => "aws_reuse",
            Self::Azure => "azure_reuse",
            Self::Gcp => "gcp_reuse",
        }
    }

    /// Service label stamped on workloads to force a task roll after rotation.
    pub fn rotated_label(&self) -> String {
        format!("{}.secret.rotated", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vault" => Ok(Self::Vault),
            "openbao" => Ok(Self::OpenBao),
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            "gcp" => Ok(Self::Gcp),
            other => Err(Error::config(format!("Unknown secrets provider: {}", other))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Contract every backend adapter implements.
///
/// Implementations must be `Send + Sync` for use across the plugin handlers
/// and the rotation task.
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Identifier of this provider, used for label keys and tracking records.
    fn kind(&self) -> ProviderKind;

    /// Whether the rotation engine may track secrets served by this provider.
    fn supports_rotation(&self) -> bool {
        true
    }

    /// Derive the backend locator for a request. Pure; performs no I/O.
    fn locate(&self, request: &SecretRequest) -> String;

    /// Fetch and extract the secret bytes for a request.
    async fn fetch(&self, request: &SecretRequest) -> Result<Vec<u8>>;

    /// Fetch and extract by a previously derived locator and field, without
    /// consulting request labels. The sentinel field `"value"` selects the
    /// default extraction.
    async fn fetch_at(&self, locator: &str, field: &str) -> Result<Vec<u8>>;

    /// Re-fetch the tracked secret and compare fingerprints.
    ///
    /// Errors are not change signals: callers log them and treat the record
    /// as unchanged, so transient backend faults never trigger rotations.
    async fn check_changed(&self, record: &TrackedSecret) -> Result<bool> {
        let value = self.fetch_at(&record.locator, &record.field).await?;
        Ok(fingerprint_hex(&value) != record.fingerprint)
    }

    /// Release backend resources. Failures are logged by the caller.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Construct and initialize the configured provider.
///
/// Fails closed: missing mandatory settings or a failed backend handshake
/// abort daemon startup.
pub async fn create_provider(
    kind: ProviderKind,
    settings: &HashMap<String, String>,
) -> Result<Arc<dyn SecretsProvider>> {
    match kind {
        ProviderKind::Vault => Ok(Arc::new(vault::VaultProvider::from_settings(settings).await?)),
        ProviderKind::OpenBao => {
            Ok(Arc::new(openbao::OpenBaoProvider::from_settings(settings).await?))
        }
        ProviderKind::Aws => Ok(Arc::new(aws::AwsProvider::from_settings(settings).await?)),
        ProviderKind::Azure => Ok(Arc::new(azure::AzureProvider::from_settings(settings).await?)),
        ProviderKind::Gcp => Ok(Arc::new(gcp::GcpProvider::from_settings(settings).await?)),
    }
}

/// Map a recorded field back to an extraction override: the sentinel
/// `"value"` means "default extraction".
pub fn field_override(field: &str) -> Option<&str> {
    if field == DEFAULT_FIELD {
        None
    } else {
        Some(field)
    }
}

/// Non-empty setting lookup.
pub(crate) fn setting(settings: &HashMap<String, String>, key: &str) -> Option<String> {
    settings
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Setting lookup with a default.
pub(crate) fn setting_or(settings: &HashMap<String, String>, key: &str, default: &str) -> String {
    setting(settings, key).unwrap_or_else(|| default.to_string())
}
