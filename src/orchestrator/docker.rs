//! Docker Engine implementation of the orchestrator client.
//!
//! Swarm secrets are immutable, so rotation works by creating a fresh secret
//! object and repointing service references; this module only translates the
//! five control-plane operations onto the Engine API.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bollard::models::{
    SecretSpec, ServiceSpec, TaskSpecContainerSpecFile, TaskSpecContainerSpecSecrets,
};
use bollard::secret::ListSecretsOptions;
use bollard::service::{InspectServiceOptions, ListServicesOptions, UpdateServiceOptions};
use bollard::Docker;
use tracing::debug;

use super::{OrchestratorClient, SecretAttachment, SecretObject, Workload, WorkloadSpec};
use crate::errors::{Error, Result};

/// Docker Engine client for Swarm secrets and services.
#[derive(Debug, Clone)]
pub struct DockerOrchestrator {
    docker: Docker,
}

impl DockerOrchestrator {
    /// Connect using the standard environment (`DOCKER_HOST` or the local
    /// socket).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::orchestrator(format!("failed to create docker client: {}", e)))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl OrchestratorClient for DockerOrchestrator {
    async fn list_secrets(&self) -> Result<Vec<SecretObject>> {
        let secrets = self
            .docker
            .list_secrets(None::<ListSecretsOptions<String>>)
            .await
            .map_err(|e| Error::orchestrator(format!("failed to list secrets: {}", e)))?;

        Ok(secrets
            .into_iter()
            .filter_map(|secret| {
                let id = secret.id?;
                let spec = secret.spec?;
                Some(SecretObject {
                    id,
                    name: spec.name.unwrap_or_default(),
                    labels: spec.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn create_secret(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
        data: &[u8],
    ) -> Result<String> {
        let spec = SecretSpec {
            name: Some(name.to_string()),
            labels: Some(labels.clone()),
            data: Some(STANDARD.encode(data)),
            ..Default::default()
        };

        let response = self
            .docker
            .create_secret(spec)
            .await
            .map_err(|e| Error::orchestrator(format!("failed to create secret {}: {}", name, e)))?;

        debug!(secret = %name, id = %response.id, "Created docker secret");
        Ok(response.id)
    }

    async fn delete_secret(&self, id: &str) -> Result<()> {
        self.docker
            .delete_secret(id)
            .await
            .map_err(|e| Error::orchestrator(format!("failed to remove secret {}: {}", id, e)))
    }

    async fn list_workloads(&self) -> Result<Vec<Workload>> {
        let services = self
            .docker
            .list_services(None::<ListServicesOptions<String>>)
            .await
            .map_err(|e| Error::orchestrator(format!("failed to list services: {}", e)))?;

        Ok(services
            .into_iter()
            .filter_map(|service| {
                let id = service.id?;
                let version = service.version.and_then(|v| v.index).unwrap_or_default();
                let spec = service.spec?;

                let secrets = spec
                    .task_template
                    .as_ref()
                    .and_then(|task| task.container_spec.as_ref())
                    .and_then(|container| container.secrets.as_ref())
                    .map(|secrets| secrets.iter().map(attachment_from_docker).collect())
                    .unwrap_or_default();

                Some(Workload {
                    id,
                    version,
                    spec: WorkloadSpec {
                        name: spec.name.unwrap_or_default(),
                        labels: spec.labels.unwrap_or_default(),
                        secrets,
                    },
                })
            })
            .collect())
    }

    async fn update_workload(
        &self,
        id: &str,
        version: u64,
        spec: WorkloadSpec,
    ) -> Result<Vec<String>> {
        // Re-read the full service spec and overlay only what the daemon
        // owns (labels + secret references); everything else must survive
        // the update untouched. The version gate still rejects lost races.
        let service = self
            .docker
            .inspect_service(id, None::<InspectServiceOptions>)
            .await
            .map_err(|e| Error::orchestrator(format!("failed to inspect service {}: {}", id, e)))?;

        let mut service_spec: ServiceSpec = service.spec.unwrap_or_default();
        service_spec.labels = Some(spec.labels.clone());
        if let Some(task) = service_spec.task_template.as_mut() {
            if let Some(container) = task.container_spec.as_mut() {
                container.secrets =
                    Some(spec.secrets.iter().map(attachment_to_docker).collect());
            }
        }

        let options = UpdateServiceOptions { version: version as u64, ..Default::default() };
        let response = self
            .docker
            .update_service(id, service_spec, options, None)
            .await
            .map_err(|e| {
                Error::orchestrator(format!("failed to update service {}: {}", spec.name, e))
            })?;

        Ok(response.warnings.unwrap_or_default())
    }
}

fn attachment_from_docker(secret: &TaskSpecContainerSpecSecrets) -> SecretAttachment {
    let file = secret.file.clone().unwrap_or_default();
    SecretAttachment {
        secret_id: secret.secret_id.clone().unwrap_or_default(),
        secret_name: secret.secret_name.clone().unwrap_or_default(),
        file_name: file.name.unwrap_or_default(),
        uid: file.uid.unwrap_or_default(),
        gid: file.gid.unwrap_or_default(),
        mode: file.mode.unwrap_or_default(),
    }
}

fn attachment_to_docker(attachment: &SecretAttachment) -> TaskSpecContainerSpecSecrets {
    TaskSpecContainerSpecSecrets {
        file: Some(TaskSpecContainerSpecFile {
            name: Some(attachment.file_name.clone()),
            uid: Some(attachment.uid.clone()),
            gid: Some(attachment.gid.clone()),
            mode: Some(attachment.mode),
        }),
        secret_id: Some(attachment.secret_id.clone()),
        secret_name: Some(attachment.secret_name.clone()),
    }
}
