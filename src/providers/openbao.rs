//! OpenBao secret provider.
//!
//! OpenBao is API-compatible with Vault's KV engine, so the adapter mirrors
//! the Vault provider but reads its own configuration keys and label
//! vocabulary (`openbao_path`, `openbao_field`, ...).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::{kv1, kv2};

use super::extract;
use super::naming::{self, DEFAULT_KV_MOUNT};
use super::vault::classify_client_error;
use super::{field_override, setting, setting_or, ProviderKind, SecretsProvider};
use crate::api::types::SecretRequest;
use crate::errors::{Error, Result};

/// Configuration for the OpenBao provider.
#[derive(Debug, Clone)]
pub struct OpenBaoConfig {
    pub address: String,
    pub token: Option<String>,
    pub mount_path: String,
    pub role_id: Option<String>,
    pub secret_id: Option<String>,
    pub auth_method: String,
    pub ca_cert: Option<String>,
}

impl OpenBaoConfig {
    /// Load configuration from `OPENBAO_*` settings. The address defaults to
    /// a local listener.
    pub fn from_settings(settings: &HashMap<String, String>) -> Self {
        Self {
            address: setting_or(settings, "OPENBAO_ADDR", "http://localhost:8200"),
            token: setting(settings, "OPENBAO_TOKEN"),
            mount_path: setting_or(settings, "OPENBAO_MOUNT_PATH", DEFAULT_KV_MOUNT),
            role_id: setting(settings, "OPENBAO_ROLE_ID"),
            secret_id: setting(settings, "OPENBAO_SECRET_ID"),
            auth_method: setting_or(settings, "OPENBAO_AUTH_METHOD", "token"),
            ca_cert: setting(settings, "OPENBAO_CACERT"),
        }
    }
}

/// OpenBao KV secret provider.
pub struct OpenBaoProvider {
    client: VaultClient,
    mount_path: String,
}

impl std::fmt::Debug for OpenBaoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenBaoProvider")
            .field("mount_path", &self.mount_path)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl OpenBaoProvider {
    pub async fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        Self::new(OpenBaoConfig::from_settings(settings)).await
    }

    pub async fn new(config: OpenBaoConfig) -> Result<Self> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);
        if let Some(ref ca_cert) = config.ca_cert {
            settings_builder.ca_certs(vec![ca_cert.clone()]);
        }

        let settings = settings_builder
            .build()
            .map_err(|e| Error::config(format!("Invalid OpenBao configuration: {}", e)))?;

        let mut client = VaultClient::new(settings)
            .map_err(|e| Error::config(format!("Failed to create OpenBao client: {}", e)))?;

        match config.auth_method.as_str() {
            "token" => {
                let token = config.token.as_deref().ok_or_else(|| {
                    Error::config("OPENBAO_TOKEN is required for token authentication")
                })?;
                client.set_token(token);
            }
            "approle" => {
                let (role_id, secret_id) = match (&config.role_id, &config.secret_id) {
                    (Some(role_id), Some(secret_id)) => (role_id, secret_id),
                    _ => {
                        return Err(Error::config(
                            "OPENBAO_ROLE_ID and OPENBAO_SECRET_ID are required for approle authentication",
                        ))
                    }
                };
                let auth = vaultrs::auth::approle::login(&client, "approle", role_id, secret_id)
                    .await
                    .map_err(|e| {
                        Error::authentication_failed(format!("approle login failed: {}", e))
                    })?;
                client.set_token(&auth.client_token);
            }
            other => {
                return Err(Error::config(format!(
                    "unsupported authentication method: {}",
                    other
                )))
            }
        }

        info!(
            address = %config.address,
            mount = %config.mount_path,
            auth_method = %config.auth_method,
            "Initialized OpenBao provider"
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
impl SecretsProvider for OpenBaoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenBao
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
        debug!(path = %locator, "Reading secret from OpenBao");
        let data = self.read_map(naming::kv_relative_path(&locator, &self.mount_path)).await?;
        extract::extract_from_map(&data, request.label(self.kind().field_label()))
    }

    async fn fetch_at(&self, locator: &str, field: &str) -> Result<Vec<u8>> {
        let data = self.read_map(naming::kv_relative_path(locator, &self.mount_path)).await?;
        extract::extract_from_map(&data, field_override(field))
    }
}
