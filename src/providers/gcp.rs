//! GCP Secret Manager provider.
//!
//! ## Configuration
//!
//! - `GCP_PROJECT_ID` - required
//! - `GCP_CREDENTIALS_JSON` - inline service account key, or
//! - `GOOGLE_APPLICATION_CREDENTIALS` - path to a service account key file
//!
//! ## Locators
//!
//! Locators are full version-qualified resource names
//! (`projects/{p}/secrets/{s}/versions/{v}`); short references are qualified
//! with the configured project and `latest`.

use std::collections::HashMap;

use async_trait::async_trait;
use google_secretmanager1::{hyper_rustls, hyper_util, SecretManager};
use tracing::{debug, info};

use super::extract;
use super::naming;
use super::{field_override, setting, ProviderKind, SecretsProvider};
use crate::api::types::SecretRequest;
use crate::errors::{Error, Result};

/// Configuration for the GCP Secret Manager provider.
#[derive(Debug, Clone)]
pub struct GcpConfig {
    pub project_id: String,
    pub credentials_path: Option<String>,
    pub credentials_json: Option<String>,
}

impl GcpConfig {
    /// Load configuration from the settings map. `GCP_PROJECT_ID` is
    /// required.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        let project_id = setting(settings, "GCP_PROJECT_ID")
            .ok_or_else(|| Error::config("GCP_PROJECT_ID is required"))?;

        Ok(Self {
            project_id,
            credentials_path: setting(settings, "GOOGLE_APPLICATION_CREDENTIALS"),
            credentials_json: setting(settings, "GCP_CREDENTIALS_JSON"),
        })
    }
}

/// GCP Secret Manager provider.
pub struct GcpProvider {
    hub: SecretManager<
        hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    >,
    project_id: String,
}

impl std::fmt::Debug for GcpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpProvider")
            .field("project_id", &self.project_id)
            .field("hub", &"[SecretManager]")
            .finish()
    }
}

impl GcpProvider {
    pub async fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        Self::new(GcpConfig::from_settings(settings)?).await
    }

    pub async fn new(config: GcpConfig) -> Result<Self> {
        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(
                    hyper_rustls::HttpsConnectorBuilder::new()
                        .with_native_roots()
                        .map_err(|e| {
                            Error::config(format!("Failed to load native TLS roots: {}", e))
                        })?
                        .https_or_http()
                        .enable_http2()
                        .build(),
                );

        let service_account_key = if let Some(ref json) = config.credentials_json {
            yup_oauth2::parse_service_account_key(json)
                .map_err(|e| Error::config(format!("Invalid GCP_CREDENTIALS_JSON: {}", e)))?
        } else if let Some(ref path) = config.credentials_path {
            yup_oauth2::read_service_account_key(path).await.map_err(|e| {
                Error::config(format!("Failed to read GCP credentials from {}: {}", path, e))
            })?
        } else {
            return Err(Error::config(
                "GCP_CREDENTIALS_JSON or GOOGLE_APPLICATION_CREDENTIALS is required",
            ));
        };

        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(service_account_key)
            .build()
            .await
            .map_err(|e| Error::config(format!("Failed to build GCP authenticator: {}", e)))?;

        let hub = SecretManager::new(client, auth);

        info!(project_id = %config.project_id, "Initialized GCP Secret Manager provider");
        Ok(Self { hub, project_id: config.project_id })
    }

    async fn read_payload(&self, resource_name: &str) -> Result<Vec<u8>> {
        match self.hub.projects().secrets_versions_access(resource_name).doit().await {
            Ok((_, response)) => response
                .payload
                .and_then(|payload| payload.data)
                .filter(|data| !data.is_empty())
                .ok_or_else(|| {
                    Error::payload(format!("secret {} has no payload data", resource_name))
                }),
            Err(e) => {
                let message = e.to_string();
                if message.contains("NOT_FOUND") || message.contains("404") {
                    Err(Error::not_found(resource_name))
                } else if message.contains("PERMISSION_DENIED") || message.contains("403") {
                    Err(Error::authentication_failed(message))
                } else {
                    Err(Error::connection_failed(message))
                }
            }
        }
    }
}

#[async_trait]
impl SecretsProvider for GcpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    fn locate(&self, request: &SecretRequest) -> String {
        if let Some(custom) = request.label(self.kind().path_label()) {
            return resource_name(&self.project_id, custom);
        }
        let name = naming::sanitize_resource_name(&naming::hyphen_join(
            request.service(),
            &request.secret_name,
        ));
        resource_name(&self.project_id, &name)
    }

    async fn fetch(&self, request: &SecretRequest) -> Result<Vec<u8>> {
        let locator = self.locate(request);
        debug!(resource = %locator, "Reading secret from GCP Secret Manager");
        let payload = self.read_payload(&locator).await?;
        extract::extract_value(&payload, request.label(self.kind().field_label()))
    }

    async fn fetch_at(&self, locator: &str, field: &str) -> Result<Vec<u8>> {
        let payload = self.read_payload(locator).await?;
        extract::extract_value(&payload, field_override(field))
    }
}

/// Qualify a reference into a full, version-pinned resource name.
fn resource_name(project_id: &str, reference: &str) -> String {
    if reference.starts_with("projects/") {
        if reference.contains("/versions/") {
            reference.to_string()
        } else {
            format!("{}/versions/latest", reference)
        }
    } else if reference.contains("/versions/") {
        format!("projects/{}/secrets/{}", project_id, reference)
    } else {
        format!("projects/{}/secrets/{}/versions/latest", project_id, reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_requires_project_id() {
        assert!(GcpConfig::from_settings(&HashMap::new()).is_err());
    }

    #[test]
    fn test_resource_name_qualification() {
        assert_eq!(
            resource_name("proj", "db"),
            "projects/proj/secrets/db/versions/latest"
        );
        assert_eq!(
            resource_name("proj", "db/versions/3"),
            "projects/proj/secrets/db/versions/3"
        );
        assert_eq!(
            resource_name("proj", "projects/other/secrets/db"),
            "projects/other/secrets/db/versions/latest"
        );
        assert_eq!(
            resource_name("proj", "projects/other/secrets/db/versions/7"),
            "projects/other/secrets/db/versions/7"
        );
    }

    #[test]
    fn test_default_name_is_sanitized() {
        // svc + "my secret!" joins with '-' then sanitizes to a resource id.
        let joined = naming::hyphen_join(Some("svc"), "my secret!");
        let name = naming::sanitize_resource_name(&joined);
        assert_eq!(resource_name("proj", &name), "projects/proj/secrets/svc-my_secret_/versions/latest");
    }
}
