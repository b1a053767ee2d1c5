//! Payload extraction shared by all provider adapters.
//!
//! Given the raw backend payload and an optional field selection, produce the
//! single byte string delivered to the orchestrator:
//!
//! 1. With an explicit field: the payload must be a JSON object containing
//!    that field; otherwise the error names the available top-level keys. The
//!    sole exception is the field `"value"` against a non-JSON payload, which
//!    passes the payload through verbatim.
//! 2. Without a field: try `value`, `password`, `secret`, `data` in order,
//!    then the first string-typed member, then fail.
//! 3. Payloads that are not JSON objects are delivered verbatim.

use serde_json::{Map, Value};

use crate::errors::{Error, Result};
use super::DEFAULT_FIELD;

/// Field-preference order when no explicit field is requested.
const DEFAULT_FIELDS: [&str; 4] = ["value", "password", "secret", "data"];

/// Extract the deliverable bytes from a raw backend payload.
pub fn extract_value(payload: &[u8], field: Option<&str>) -> Result<Vec<u8>> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(data)) => extract_from_map(&data, field),
        _ => match field {
            None => Ok(payload.to_vec()),
            Some(DEFAULT_FIELD) => Ok(payload.to_vec()),
            Some(field) => Err(Error::payload(format!(
                "field '{}' not found in non-JSON secret",
                field
            ))),
        },
    }
}

/// Extract from an already-parsed JSON object (KV backends hand these over
/// with the version envelope removed).
pub fn extract_from_map(data: &Map<String, Value>, field: Option<&str>) -> Result<Vec<u8>> {
    if let Some(field) = field {
        return match data.get(field) {
            Some(value) => Ok(scalar_bytes(value)),
            None => Err(Error::field_not_found(field, data.keys())),
        };
    }

    for candidate in DEFAULT_FIELDS {
        if let Some(value) = data.get(candidate) {
            return Ok(scalar_bytes(value));
        }
    }

    // No conventional field; fall back to the first string-typed member.
    for value in data.values() {
        if let Value::String(s) = value {
            return Ok(s.clone().into_bytes());
        }
    }

    Err(Error::payload("no suitable secret value found"))
}

/// Default scalar formatting: strings bare, other scalars via `to_string`,
/// nested containers as compact JSON.
fn scalar_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.clone().into_bytes(),
        other => other.to_string().into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(raw: &str) -> Map<String, Value> {
        match serde_json::from_str(raw).unwrap() {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_non_json_payload_is_verbatim() {
        let value = extract_value(b"plain-bytes", None).unwrap();
        assert_eq!(value, b"plain-bytes");
    }

    #[test]
    fn test_value_field_preferred() {
        let value = extract_value(br#"{"value": "x", "password": "y"}"#, None).unwrap();
        assert_eq!(value, b"x");
    }

    #[test]
    fn test_default_field_order() {
        let value = extract_value(br#"{"secret": "s", "password": "p"}"#, None).unwrap();
        assert_eq!(value, b"p");
    }

    #[test]
    fn test_first_string_fallback() {
        let value = extract_value(br#"{"k": "x", "n": 3}"#, None).unwrap();
        assert_eq!(value, b"x");
    }

    #[test]
    fn test_no_string_values_is_an_error() {
        let err = extract_value(br#"{"n": 1, "b": true}"#, None).unwrap_err();
        assert!(err.to_string().contains("no suitable secret value"));
    }

    #[test]
    fn test_explicit_field() {
        let value = extract_value(br#"{"password": "p1"}"#, Some("password")).unwrap();
        assert_eq!(value, b"p1");
    }

    #[test]
    fn test_missing_field_names_available_keys() {
        let err = extract_value(br#"{"host": "h", "port": 5432}"#, Some("password")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("password"), "message = {message}");
        assert!(message.contains("host, port"), "message = {message}");
    }

    #[test]
    fn test_field_on_non_json_payload() {
        // Requesting a concrete field from a non-JSON payload fails...
        let err = extract_value(b"plain", Some("password")).unwrap_err();
        assert!(err.to_string().contains("non-JSON"));

        // ...except the sentinel "value", which passes the bytes through.
        let value = extract_value(b"plain", Some("value")).unwrap();
        assert_eq!(value, b"plain");
    }

    #[test]
    fn test_scalar_coercion() {
        let value = extract_value(br#"{"value": 42}"#, None).unwrap();
        assert_eq!(value, b"42");

        let value = extract_value(br#"{"value": true}"#, Some("value")).unwrap();
        assert_eq!(value, b"true");
    }

    #[test]
    fn test_non_object_json_is_verbatim() {
        // A bare JSON string is not an object; deliver the raw bytes.
        let value = extract_value(br#""quoted""#, None).unwrap();
        assert_eq!(value, br#""quoted""#);
    }

    #[test]
    fn test_extract_from_map_with_field() {
        let data = object(r#"{"password": "p2", "username": "u"}"#);
        assert_eq!(extract_from_map(&data, Some("password")).unwrap(), b"p2");
        assert!(extract_from_map(&data, Some("token")).is_err());
    }
}
