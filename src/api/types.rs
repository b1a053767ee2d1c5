//! Wire types for the Docker secret driver plugin protocol.
//!
//! Swarm POSTs a JSON request to `/SecretProvider.GetSecret` and expects a
//! JSON response whose `Value` field is base64-encoded (the JSON encoding of
//! a Go byte slice). Driver failures travel in the `Err` field; the HTTP
//! layer always answers 200.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A secret fetch request from the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretRequest {
    /// Logical name of the Swarm secret object.
    #[serde(rename = "SecretName")]
    pub secret_name: String,

    /// Consumer service that triggered this fetch, when known.
    #[serde(rename = "ServiceName", default)]
    pub service_name: String,

    /// Labels the operator attached to the Swarm secret. Consulted for
    /// per-provider overrides (locator path, JSON field, reuse policy).
    #[serde(rename = "SecretLabels", default)]
    pub labels: HashMap<String, String>,
}

impl SecretRequest {
    pub fn new(secret_name: impl Into<String>) -> Self {
        Self { secret_name: secret_name.into(), ..Default::default() }
    }

    pub fn with_service(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// The consumer service, treating the empty string as absent.
    pub fn service(&self) -> Option<&str> {
        let service = self.service_name.trim();
        if service.is_empty() {
            None
        } else {
            Some(service)
        }
    }

    /// Look up a request label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Response to a secret fetch request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretResponse {
    /// The secret bytes, base64 on the wire.
    #[serde(rename = "Value", default, with = "base64_bytes")]
    pub value: Option<Vec<u8>>,

    /// Tells Swarm not to cache this value across tasks.
    #[serde(rename = "DoNotReuse", default)]
    pub do_not_reuse: bool,

    /// Error message; empty on success.
    #[serde(rename = "Err", default, skip_serializing_if = "String::is_empty")]
    pub err: String,
}

impl SecretResponse {
    pub fn success(value: Vec<u8>, do_not_reuse: bool) -> Self {
        Self { value: Some(value), do_not_reuse, err: String::new() }
    }

    pub fn error(err: impl Into<String>) -> Self {
        Self { value: None, do_not_reuse: false, err: err.into() }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
