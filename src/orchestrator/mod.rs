//! Orchestrator control-plane interface.
//!
//! The rotation engine mutates orchestrator state exclusively through
//! [`OrchestratorClient`]; the fetch path never does. Keeping the surface to
//! these five operations makes the engine testable against an in-memory
//! double and keeps the Docker dependency confined to [`docker`].

pub mod docker;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::Result;

/// An immutable secret object held by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretObject {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// A secret reference inside a workload's task template. Mount attributes
/// are preserved verbatim when the reference is rewritten during rotation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecretAttachment {
    pub secret_id: String,
    pub secret_name: String,
    /// In-container mount file name.
    pub file_name: String,
    pub uid: String,
    pub gid: String,
    pub mode: u32,
}

/// A deployable unit that may consume secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub id: String,
    /// Version counter the orchestrator uses to reject stale updates.
    pub version: u64,
    pub spec: WorkloadSpec,
}

/// The mutable portion of a workload definition the daemon touches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkloadSpec {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub secrets: Vec<SecretAttachment>,
}

/// Client for the orchestrator control plane.
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// List all secret objects.
    async fn list_secrets(&self) -> Result<Vec<SecretObject>>;

    /// Create a secret object; returns its identifier.
    async fn create_secret(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
        data: &[u8],
    ) -> Result<String>;

    /// Delete a secret object by identifier.
    async fn delete_secret(&self, id: &str) -> Result<()>;

    /// List all workloads with their secret references.
    async fn list_workloads(&self) -> Result<Vec<Workload>>;

    /// Submit an updated workload spec at the given version; returns any
    /// warnings emitted by the orchestrator.
    async fn update_workload(
        &self,
        id: &str,
        version: u64,
        spec: WorkloadSpec,
    ) -> Result<Vec<String>>;
}
