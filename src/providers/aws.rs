//! AWS Secrets Manager provider.
//!
//! Credentials resolve through the SDK's default chain; explicit static keys
//! in the settings override it. `AWS_ENDPOINT_URL` points the client at a
//! LocalStack-style endpoint for development.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_secretsmanager::config::Credentials;
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;
use tracing::{debug, info};

use super::extract;
use super::naming;
use super::{field_override, setting, setting_or, ProviderKind, SecretsProvider};
use crate::api::types::SecretRequest;
use crate::errors::{Error, Result};

/// Configuration for the AWS Secrets Manager provider.
#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    /// Load configuration from `AWS_*` settings; the region defaults to
    /// `us-east-1`.
    pub fn from_settings(settings: &HashMap<String, String>) -> Self {
        Self {
            region: setting_or(settings, "AWS_REGION", "us-east-1"),
            access_key: setting(settings, "AWS_ACCESS_KEY_ID"),
            secret_key: setting(settings, "AWS_SECRET_ACCESS_KEY"),
            profile: setting(settings, "AWS_PROFILE"),
            endpoint_url: setting(settings, "AWS_ENDPOINT_URL"),
        }
    }
}

/// AWS Secrets Manager provider.
#[derive(Debug, Clone)]
pub struct AwsProvider {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsProvider {
    pub async fn from_settings(settings: &HashMap<String, String>) -> Result<Self> {
        Ok(Self::new(AwsConfig::from_settings(settings)).await)
    }

    /// Create a client from the configuration. Credential validity is only
    /// observable on the first call; client construction itself cannot fail.
    pub async fn new(config: AwsConfig) -> Self {
        let mut loader = aws_config::from_env().region(Region::new(config.region.clone()));

        if let Some(ref profile) = config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
            info!(endpoint = %endpoint, "AWS Secrets Manager using custom endpoint");
        }
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader
                .credentials_provider(Credentials::new(access_key, secret_key, None, None, "static"));
        }

        let sdk_config = loader.load().await;
        let client = aws_sdk_secretsmanager::Client::new(&sdk_config);

        info!(region = %config.region, "Initialized AWS Secrets Manager provider");
        Self { client }
    }

    async fn read_string(&self, secret_name: &str) -> Result<String> {
        let result = self
            .client
            .get_secret_value()
            .secret_id(secret_name)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                GetSecretValueError::ResourceNotFoundException(_) => Error::not_found(secret_name),
                other => Error::backend(other.to_string()),
            })?;

        result
            .secret_string()
            .map(str::to_owned)
            .ok_or_else(|| Error::payload(format!("secret {} has no string value", secret_name)))
    }
}

#[async_trait]
impl SecretsProvider for AwsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    fn locate(&self, request: &SecretRequest) -> String {
        naming::flat_locator(
            request.label(self.kind().path_label()),
            request.service(),
            &request.secret_name,
        )
    }

    async fn fetch(&self, request: &SecretRequest) -> Result<Vec<u8>> {
        let locator = self.locate(request);
        debug!(secret = %locator, "Reading secret from AWS Secrets Manager");
        let payload = self.read_string(&locator).await?;
        extract::extract_value(payload.as_bytes(), request.label(self.kind().field_label()))
    }

    async fn fetch_at(&self, locator: &str, field: &str) -> Result<Vec<u8>> {
        let payload = self.read_string(locator).await?;
        extract::extract_value(payload.as_bytes(), field_override(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = AwsConfig::from_settings(&HashMap::new());
        assert_eq!(config.region, "us-east-1");
        assert!(config.access_key.is_none());
        assert!(config.endpoint_url.is_none());
    }

    #[test]
    fn test_config_overrides() {
        let config = AwsConfig::from_settings(&settings(&[
            ("AWS_REGION", "eu-west-1"),
            ("AWS_ENDPOINT_URL", "http://localhost:4566"),
        ]));
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:4566"));
    }

    #[tokio::test]
    async fn test_locate_flat_names() {
        let provider = AwsProvider::new(AwsConfig::from_settings(&HashMap::new())).await;

        let request = SecretRequest::new("api-key").with_service("prod");
        assert_eq!(provider.locate(&request), "prod/api-key");

        let request = SecretRequest::new("api-key");
        assert_eq!(provider.locate(&request), "api-key");

        let request = SecretRequest::new("api-key").with_label("aws_secret_name", "shared/key");
        assert_eq!(provider.locate(&request), "shared/key");
    }
}
