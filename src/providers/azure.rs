//! Azure Key Vault provider.
//!
//! Authenticates with a service principal (OAuth2 client credentials) when
//! `AZURE_TENANT_ID`/`AZURE_CLIENT_ID`/`AZURE_CLIENT_SECRET` are all set and
//! falls back to the instance metadata (managed identity) endpoint otherwise.
//! Secrets are read over the Key Vault REST API.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::extract;
use super::naming;
use super::{field_override, setting, ProviderKind, SecretsProvider};
use crate::api::types::SecretRequest;
use crate::errors::{Error, Result};

const KEY_VAULT_API_VERSION: &str = "7.4";
const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const KEY_VAULT_RESOURCE: &str = "https://vault.azure.net";
const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Refresh the cached token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Configuration for the Azure Key Vault provider.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    /// Key Vault base URL, normalized to end with `/`.
    pub vault_url: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl AzureConfig {
    /// Load configuration from `AZURE_*` settings. `AZURE_VAULT_URL` is
    /// required.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        let mut vault_url = setting(settings, "AZURE_VAULT_URL")
            .ok_or_else(|| Error::config("AZURE_VAULT_URL is required"))?;
        if !vault_url.ends_with('/') {
            vault_url.push('/');
        }

        Ok(Self {
            vault_url,
            tenant_id: setting(settings, "AZURE_TENANT_ID"),
            client_id: setting(settings, "AZURE_CLIENT_ID"),
            client_secret: setting(settings, "AZURE_CLIENT_SECRET"),
        })
    }

    fn service_principal(&self) -> Option<(&str, &str, &str)> {
        match (&self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(tenant), Some(client), Some(secret)) => {
                Some((tenant.as_str(), client.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    // The AAD endpoint returns a number, IMDS returns a string.
    #[serde(deserialize_with = "seconds_from_string_or_number", default)]
    expires_in: u64,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: Option<String>,
}

/// Azure Key Vault provider.
pub struct AzureProvider {
    http: reqwest::Client,
    config: AzureConfig,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for AzureProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureProvider")
            .field("vault_url", &self.config.vault_url)
            .finish()
    }
}

impl AzureProvider {
    /// Build the provider and perform the credential handshake (fail closed).
    pub async fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        Self::new(AzureConfig::from_settings(settings)?).await
    }

    pub async fn new(config: AzureConfig) -> Result<Self> {
        if config.service_principal().is_some() {
            info!("Authenticating with Azure using service principal credentials");
        } else {
            info!("Service principal credentials not set; falling back to managed identity");
        }

        let provider = Self {
            http: reqwest::Client::new(),
            config,
            token: RwLock::new(None),
        };
        provider.bearer_token().await?;

        info!(vault_url = %provider.config.vault_url, "Initialized Azure Key Vault provider");
        Ok(provider)
    }

    async fn bearer_token(&self) -> Result<String> {
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.token.clone());
            }
        }

        let mut guard = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.request_token().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let response = match self.config.service_principal() {
            Some((tenant, client_id, client_secret)) => {
                let url = format!("https://login.microsoftonline.com/{}/oauth2/v2.0/token", tenant);
                self.http
                    .post(&url)
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id),
                        ("client_secret", client_secret),
                        ("scope", KEY_VAULT_SCOPE),
                    ])
                    .send()
                    .await
            }
            None => {
                self.http
                    .get(IMDS_TOKEN_ENDPOINT)
                    .query(&[("api-version", "2018-02-01"), ("resource", KEY_VAULT_RESOURCE)])
                    .header("Metadata", "true")
                    .send()
                    .await
            }
        }
        .map_err(|e| Error::connection_failed(format!("Azure token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::authentication_failed(format!(
                "Azure token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::authentication_failed(format!("invalid token response: {}", e)))?;

        Ok(CachedToken {
            token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }

    async fn read_value(&self, secret_name: &str) -> Result<String> {
        let token = self.bearer_token().await?;
        let url = format!("{}secrets/{}", self.config.vault_url, secret_name);

        let response = self
            .http
            .get(&url)
            .query(&[("api-version", KEY_VAULT_API_VERSION)])
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::connection_failed(format!("Key Vault request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {
                let bundle: SecretBundle = response.json().await.map_err(|e| {
                    Error::payload(format!("invalid Key Vault response: {}", e))
                })?;
                bundle.value.ok_or_else(|| {
                    Error::payload(format!("secret '{}' was found but has no value", secret_name))
                })
            }
            StatusCode::NOT_FOUND => Err(Error::not_found(secret_name)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                Error::authentication_failed(format!("Key Vault denied access to '{}'", secret_name)),
            ),
            other => Err(Error::backend(format!("Key Vault returned {}", other))),
        }
    }
}

#[async_trait]
impl SecretsProvider for AzureProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn locate(&self, request: &SecretRequest) -> String {
        if let Some(custom) = request.label(self.kind().path_label()) {
            return custom.to_string();
        }
        naming::sanitize_key_vault_name(&naming::hyphen_join(
            request.service(),
            &request.secret_name,
        ))
    }

    async fn fetch(&self, request: &SecretRequest) -> Result<Vec<u8>> {
        let locator = self.locate(request);
        debug!(secret = %locator, "Reading secret from Azure Key Vault");
        let payload = self.read_value(&locator).await?;
        extract::extract_value(payload.as_bytes(), request.label(self.kind().field_label()))
    }

    async fn fetch_at(&self, locator: &str, field: &str) -> Result<Vec<u8>> {
        let payload = self.read_value(locator).await?;
        extract::extract_value(payload.as_bytes(), field_override(field))
    }
}

fn seconds_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => {
            n.as_u64().ok_or_else(|| D::Error::custom("expires_in is not a positive integer"))
        }
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|_| D::Error::custom("expires_in is not a positive integer")),
        _ => Err(D::Error::custom("expires_in has an unexpected type")),
    }
}
