//! HashiCorp Vault secret provider.
//!
//! Reads from the KV engine: KV-v2 on the default `secret` mount (the
//! version envelope is unwrapped by the client library), KV-v1 style on any
//! other mount. Supports token and AppRole authentication.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::{kv1, kv2};

use super::extract;
use super::naming::{self, DEFAULT_KV_MOUNT};
use super::{field_override, setting, setting_or, ProviderKind, SecretsProvider};
use crate::api::types::SecretRequest;
use crate::errors::{Error, Result};

/// Configuration for the Vault provider.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address.
    pub address: String,
    /// Static client token (token auth).
    pub token: Option<String>,
    /// KV mount path (default: `secret`).
    pub mount_path: String,
    /// AppRole role id.
    pub role_id: Option<String>,
    /// AppRole secret id.
    pub secret_id: Option<String>,
    /// `token` or `approle`.
    pub auth_method: String,
    /// Optional CA bundle path for TLS verification.
    pub ca_cert: Option<String>,
}

impl VaultConfig {
    /// Load configuration from the settings map.
    ///
    /// Uses `VAULT_ADDR` (required), `VAULT_TOKEN`, `VAULT_MOUNT_PATH`,
    /// `VAULT_ROLE_ID`, `VAULT_SECRET_ID`, `VAULT_AUTH_METHOD`,
    /// `VAULT_CACERT`.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        let address = setting(settings, "VAULT_ADDR")
            .ok_or_else(|| Error::config("VAULT_ADDR is required"))?;

        if setting(settings, "VAULT_CLIENT_CERT").is_some() {
            warn!("VAULT_CLIENT_CERT is not supported and will be ignored");
        }

        Ok(Self {
            address,
            token: setting(settings, "VAULT_TOKEN"),
            mount_path: setting_or(settings, "VAULT_MOUNT_PATH", DEFAULT_KV_MOUNT),
            role_id: setting(settings, "VAULT_ROLE_ID"),
            secret_id: setting(settings, "VAULT_SECRET_ID"),
            auth_method: setting_or(settings, "VAULT_AUTH_METHOD", "token"),
            ca_cert: setting(settings, "VAULT_CACERT"),
        })
    }
}

/// HashiCorp Vault KV secret provider.
pub struct VaultProvider {
    client: VaultClient,
    mount_path: String,
}

impl std::fmt::Debug for VaultProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultProvider")
            .field("mount_path", &self.mount_path)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl VaultProvider {
    /// Build the provider from the settings map and authenticate.
    pub async fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        Self::new(VaultConfig::from_settings(settings)?).await
    }

    /// Create a provider with the given configuration and authenticate.
    pub async fn new(config: VaultConfig) -> Result<Self> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);
        if let Some(ref ca_cert) = config.ca_cert {
            settings_builder.ca_certs(vec![ca_cert.clone()]);
        }

        let settings = settings_builder
            .build()
            .map_err(|e| Error::config(format!("Invalid Vault configuration: {}", e)))?;

        let mut client = VaultClient::new(settings)
            .map_err(|e| Error::config(format!("Failed to create Vault client: {}", e)))?;

        authenticate(&mut client, &config).await?;

        info!(
            address = %config.address,
            mount = %config.mount_path,
            auth_method = %config.auth_method,
            "Initialized Vault provider"
        );

        Ok(Self { client, mount_path: config.mount_path })
    }

    async fn read_map(&self, relative_path: &str) -> Result<Map<String, Value>> {
        let result = if self.mount_path == DEFAULT_KV_MOUNT {
            kv2::read::<Map<String, Value>>(&self.client, &self.mount_path, relative_path).await
        } else {
            kv1::get::<Map<String, Value>>(&self.client, &self.mount_path, relative_path).await
        };
        result.map_err(|e| classify_client_error(relative_path, e))
    }
}

#[async_trait]
impl SecretsProvider for VaultProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Vault
    }

    fn locate(&self, request: &SecretRequest) -> String {
        naming::kv_locator(
            &self.mount_path,
            request.label(self.kind().path_label()),
            request.service(),
            &request.secret_name,
        )
    }

    async fn fetch(&self, request: &SecretRequest) -> Result<Vec<u8>> {
        let locator = self.locate(request);
        debug!(path = %locator, "Reading secret from Vault");
        let data = self.read_map(naming::kv_relative_path(&locator, &self.mount_path)).await?;
        extract::extract_from_map(&data, request.label(self.kind().field_label()))
    }

    async fn fetch_at(&self, locator: &str, field: &str) -> Result<Vec<u8>> {
        let data = self.read_map(naming::kv_relative_path(locator, &self.mount_path)).await?;
        extract::extract_from_map(&data, field_override(field))
    }
}

async fn authenticate(client: &mut VaultClient, config: &VaultConfig) -> Result<()> {
    match config.auth_method.as_str() {
        "token" => {
            let token = config
                .token
                .as_deref()
                .ok_or_else(|| Error::config("VAULT_TOKEN is required for token authentication"))?;
            client.set_token(token);
        }
        "approle" => {
            let (role_id, secret_id) = match (&config.role_id, &config.secret_id) {
                (Some(role_id), Some(secret_id)) => (role_id, secret_id),
                _ => {
                    return Err(Error::config(
                        "VAULT_ROLE_ID and VAULT_SECRET_ID are required for approle authentication",
                    ))
                }
            };
            let auth = vaultrs::auth::approle::login(client, "approle", role_id, secret_id)
                .await
                .map_err(|e| {
                    Error::authentication_failed(format!("approle login failed: {}", e))
                })?;
            client.set_token(&auth.client_token);
        }
        other => {
            return Err(Error::config(format!("unsupported authentication method: {}", other)))
        }
    }
    Ok(())
}

pub(crate) fn classify_client_error(locator: &str, err: ClientError) -> Error {
    match err {
        ClientError::APIError { code: 404, .. } => Error::not_found(locator),
        ClientError::APIError { code: 403, errors } => {
            Error::authentication_failed(errors.join(", "))
        }
        other => Error::connection_failed(other.to_string()),
    }
}
