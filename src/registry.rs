//! In-memory tracking registry for rotatable secrets.
//!
//! One record per Swarm secret name, shared between the synchronous fetch
//! path (writers) and the rotation loop (readers plus the fingerprint
//! write-back). The lock is never held across I/O: the rotation engine takes
//! a snapshot, works outside the lock, and re-acquires it briefly to record
//! the outcome.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::providers::ProviderKind;

/// Hex-encoded SHA-256 of extracted secret bytes, used as the change signal.
pub fn fingerprint_hex(value: &[u8]) -> String {
    hex::encode(Sha256::digest(value))
}

/// Bookkeeping for one rotatable secret.
#[derive(Debug, Clone)]
pub struct TrackedSecret {
    /// Swarm secret name; the registry key.
    pub orch_secret_name: String,
    /// Adapter that produced the value.
    pub provider: ProviderKind,
    /// Backend locator, sufficient to re-query without the request labels.
    pub locator: String,
    /// Selected JSON field, or `"value"` for the whole payload.
    pub field: String,
    /// Services consuming this secret, deduplicated.
    pub consumers: Vec<String>,
    /// Fingerprint of the bytes last delivered to consumers.
    pub fingerprint: String,
    /// When the fingerprint last changed.
    pub last_updated: DateTime<Utc>,
}

/// Concurrent map of Swarm secret name → tracking record.
#[derive(Debug, Default)]
pub struct SecretRegistry {
    records: RwLock<HashMap<String, TrackedSecret>>,
}

impl SecretRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record or merge into the existing one: consumers are
    /// unioned, fingerprint and timestamp refreshed. Empty consumer names
    /// are never stored.
    pub async fn upsert(&self, mut record: TrackedSecret) {
        record.consumers.retain(|c| !c.is_empty());

        let mut records = self.records.write().await;
        match records.get_mut(&record.orch_secret_name) {
            Some(existing) => {
                for consumer in record.consumers {
                    if !existing.consumers.contains(&consumer) {
                        existing.consumers.push(consumer);
                    }
                }
                existing.fingerprint = record.fingerprint;
                existing.last_updated = record.last_updated;
            }
            None => {
                record.consumers.dedup();
                records.insert(record.orch_secret_name.clone(), record);
            }
        }
    }

    /// Shallow copy of all records for iteration outside the lock.
    pub async fn snapshot(&self) -> Vec<TrackedSecret> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<TrackedSecret> {
        self.records.read().await.get(name).cloned()
    }

    /// Fingerprint write-back after a successful rotation. The fingerprint
    /// always reflects the bytes last delivered to consumers, so it moves
    /// only once the orchestrator swap has completed.
    pub async fn record_rotation(&self, name: &str, fingerprint: String) {
        if let Some(record) = self.records.write().await.get_mut(name) {
            record.fingerprint = fingerprint;
            record.last_updated = Utc::now();
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, consumer: Option<&str>, fingerprint: &str) -> TrackedSecret {
        TrackedSecret {
            orch_secret_name: name.to_string(),
            provider: ProviderKind::Vault,
            locator: format!("secret/data/{}", name),
            field: "value".to_string(),
            consumers: consumer.map(str::to_owned).into_iter().collect(),
            fingerprint: fingerprint.to_string(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_fingerprint_hex_known_vector() {
        assert_eq!(
            fingerprint_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn test_upsert_unions_consumers() {
        let registry = SecretRegistry::new();
        registry.upsert(record("db", Some("app"), "f1")).await;
        registry.upsert(record("db", Some("worker"), "f2")).await;
        registry.upsert(record("db", Some("app"), "f2")).await;

        let tracked = registry.get("db").await.unwrap();
        assert_eq!(tracked.consumers, vec!["app".to_string(), "worker".to_string()]);
        assert_eq!(tracked.fingerprint, "f2");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_drops_empty_consumer() {
        let registry = SecretRegistry::new();
        registry.upsert(record("db", None, "f1")).await;
        registry.upsert(record("db", Some(""), "f1")).await;

        let tracked = registry.get("db").await.unwrap();
        assert!(tracked.consumers.is_empty());
    }

    #[tokio::test]
    async fn test_record_rotation_moves_fingerprint_and_timestamp() {
        let registry = SecretRegistry::new();
        registry.upsert(record("db", Some("app"), "old")).await;
        let before = registry.get("db").await.unwrap().last_updated;

        registry.record_rotation("db", "new".to_string()).await;

        let tracked = registry.get("db").await.unwrap();
        assert_eq!(tracked.fingerprint, "new");
        assert!(tracked.last_updated >= before);
    }

    #[tokio::test]
    async fn test_record_rotation_unknown_name_is_noop() {
        let registry = SecretRegistry::new();
        registry.record_rotation("ghost", "f".to_string()).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let registry = SecretRegistry::new();
        registry.upsert(record("db", Some("app"), "f1")).await;

        let snapshot = registry.snapshot().await;
        registry.record_rotation("db", "f2".to_string()).await;

        assert_eq!(snapshot[0].fingerprint, "f1");
        assert_eq!(registry.get("db").await.unwrap().fingerprint, "f2");
    }
}
