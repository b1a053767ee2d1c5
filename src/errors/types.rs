//! Crate-wide error type using `thiserror`.

use thiserror::Error;

/// Result type for swarmgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving and rotating secrets.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration is missing or malformed; the daemon declines to start.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A request failed validation before reaching any backend.
    #[error("{message}")]
    Validation { message: String },

    /// The secret does not exist in the backend.
    #[error("secret not found: {locator}")]
    NotFound { locator: String },

    /// The requested JSON field is absent from the payload.
    #[error("field '{field}' not found in secret (available: {available})")]
    FieldNotFound { field: String, available: String },

    /// The payload exists but no deliverable value could be extracted.
    #[error("{message}")]
    Payload { message: String },

    /// Failed to reach the secrets backend.
    #[error("backend connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Authentication with the secrets backend failed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Backend-specific error that fits no other class.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// Orchestrator control-plane error.
    #[error("orchestrator error: {message}")]
    Orchestrator { message: String },

    /// Secret rotation failed.
    #[error("rotation failed for secret '{name}': {reason}")]
    RotationFailed { name: String, reason: String },

    /// An operation exceeded its deadline.
    #[error("operation timed out: {operation}")]
    Timeout { operation: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a not-found error for a backend locator.
    pub fn not_found(locator: impl Into<String>) -> Self {
        Self::NotFound { locator: locator.into() }
    }

    /// Create a field-not-found error listing the payload's top-level keys.
    pub fn field_not_found<'a>(
        field: impl Into<String>,
        available: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        let mut keys: Vec<&str> = available.into_iter().map(String::as_str).collect();
        keys.sort_unstable();
        let available = if keys.is_empty() { "none".to_string() } else { keys.join(", ") };
        Self::FieldNotFound { field: field.into(), available }
    }

    /// Create a payload-shape error.
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload { message: message.into() }
    }

    /// Create a connection-failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: message.into() }
    }

    /// Create an authentication-failed error.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    /// Create an orchestrator error.
    pub fn orchestrator(message: impl Into<String>) -> Self {
        Self::Orchestrator { message: message.into() }
    }

    /// Create a rotation-failed error.
    pub fn rotation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RotationFailed { name: name.into(), reason: reason.into() }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout { operation: operation.into() }
    }

    /// Whether a retry may succeed without operator intervention.
    ///
    /// Transient faults (network, auth expiry, timeouts) recover on the next
    /// fetch or rotation tick; permanent faults (missing secret, bad field,
    /// malformed payload) require a change on the operator's side.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::AuthenticationFailed { .. }
                | Self::Backend { .. }
                | Self::Orchestrator { .. }
                | Self::Timeout { .. }
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = Error::not_found("secret/data/app/db");
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(err.to_string(), "secret not found: secret/data/app/db");

        let err = Error::connection_failed("timeout");
        assert!(matches!(err, Error::ConnectionFailed { .. }));

        let err = Error::validation("secret name is required");
        assert_eq!(err.to_string(), "secret name is required");
    }

    #[test]
    fn test_field_not_found_lists_keys() {
        let keys = vec!["password".to_string(), "host".to_string()];
        let err = Error::field_not_found("value", keys.iter());
        assert_eq!(
            err.to_string(),
            "field 'value' not found in secret (available: host, password)"
        );
    }

    #[test]
    fn test_field_not_found_empty_keys() {
        let err = Error::field_not_found("password", std::iter::empty());
        assert!(err.to_string().contains("available: none"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::connection_failed("refused").is_transient());
        assert!(Error::authentication_failed("token expired").is_transient());
        assert!(Error::timeout("provider fetch").is_transient());

        assert!(!Error::not_found("x").is_transient());
        assert!(!Error::payload("no suitable secret value found").is_transient());
        assert!(!Error::config("missing key").is_transient());
    }

    #[test]
    fn test_rotation_failed_display() {
        let err = Error::rotation_failed("db", "service update failed");
        assert!(err.to_string().contains("rotation failed"));
        assert!(err.to_string().contains("db"));
    }
}
