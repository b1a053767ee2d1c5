//! Secret driver: the synchronous fetch path and daemon assembly.
//!
//! One driver instance owns the provider adapter, the tracking registry, and
//! the rotation loop. Swarm requests are served concurrently; the rotation
//! loop runs as a single supervised task.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::types::{SecretRequest, SecretResponse};
use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::orchestrator::{docker::DockerOrchestrator, OrchestratorClient};
use crate::providers::{create_provider, SecretsProvider, DEFAULT_FIELD};
use crate::registry::{fingerprint_hex, SecretRegistry, TrackedSecret};
use crate::rotation::RotationEngine;

/// Name fragments that mark a secret as single-use.
///
/// This is operator-visible policy: names containing any of these fragments
/// are never cached by Swarm across tasks unless an explicit reuse label says
/// otherwise. Innocuous names can collide with the heuristic (`certainly`,
/// `tokenizer`); use the `<provider>_reuse` label to override per secret.
const NO_REUSE_MARKERS: [&str; 3] = ["cert", "token", "dynamic"];

/// The secrets driver serving Swarm plugin requests.
pub struct SecretsDriver {
    provider: Arc<dyn SecretsProvider>,
    registry: Arc<SecretRegistry>,
    config: AppConfig,
    rotation_cancel: CancellationToken,
    rotation_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SecretsDriver {
    /// Build the daemon from configuration: instantiate the configured
    /// provider (fail closed), connect the Docker client, and start the
    /// rotation loop when enabled.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let provider = create_provider(config.provider, &config.settings).await?;
        let orchestrator: Arc<dyn OrchestratorClient> = Arc::new(DockerOrchestrator::connect()?);
        Ok(Self::assemble(config, provider, orchestrator))
    }

    /// Assemble the driver from pre-built collaborators.
    ///
    /// The rotation loop is spawned only when the global switch is on AND the
    /// provider reports rotation support. Must be called within a tokio
    /// runtime.
    pub fn assemble(
        config: AppConfig,
        provider: Arc<dyn SecretsProvider>,
        orchestrator: Arc<dyn OrchestratorClient>,
    ) -> Self {
        let registry = Arc::new(SecretRegistry::new());
        let rotation_cancel = CancellationToken::new();

        let rotation_handle = if config.enable_rotation && provider.supports_rotation() {
            info!(interval = ?config.rotation_interval, "Starting secret rotation loop");
            let engine = RotationEngine::new(
                Arc::clone(&registry),
                Arc::clone(&provider),
                orchestrator,
                config.rotation_interval,
                config.fetch_timeout,
            );
            let cancel = rotation_cancel.clone();
            Some(tokio::spawn(async move { engine.run(cancel).await }))
        } else {
            if config.enable_rotation {
                info!(
                    provider = %config.provider,
                    "Rotation is enabled but the provider does not support it"
                );
            } else {
                info!("Secret rotation is disabled");
            }
            None
        };

        Self {
            provider,
            registry,
            config,
            rotation_cancel,
            rotation_handle: Mutex::new(rotation_handle),
        }
    }

    /// The tracking registry (shared with the rotation engine).
    pub fn registry(&self) -> &Arc<SecretRegistry> {
        &self.registry
    }

    /// Serve one secret request from the orchestrator.
    ///
    /// Never panics and never fails at the transport level; errors are
    /// reported in the response for Swarm to surface.
    pub async fn get_secret(&self, request: &SecretRequest) -> SecretResponse {
        debug!(
            secret = %request.secret_name,
            provider = %self.provider.kind(),
            "Received secret request"
        );

        if request.secret_name.is_empty() {
            return SecretResponse::error("secret name is required");
        }

        match self.fetch(request).await {
            Ok(value) => {
                if self.config.enable_rotation && self.provider.supports_rotation() {
                    self.track(request, &value).await;
                }
                SecretResponse::success(value, self.should_not_reuse(request))
            }
            Err(err) => {
                error!(
                    secret = %request.secret_name,
                    provider = %self.provider.kind(),
                    error = %err,
                    "Failed to get secret"
                );
                SecretResponse::error(err.to_string())
            }
        }
    }

    async fn fetch(&self, request: &SecretRequest) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.config.fetch_timeout, self.provider.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("provider fetch")),
        }
    }

    /// Record a tracked fetch. The locator is derived here, from the request
    /// alone, so the registry stays independent of any state captured inside
    /// the adapter.
    async fn track(&self, request: &SecretRequest, value: &[u8]) {
        let kind = self.provider.kind();
        let field = request.label(kind.field_label()).unwrap_or(DEFAULT_FIELD).to_string();
        let locator = self.provider.locate(request);

        debug!(
            secret = %request.secret_name,
            locator = %locator,
            field = %field,
            "Tracking secret for rotation"
        );

        self.registry
            .upsert(TrackedSecret {
                orch_secret_name: request.secret_name.clone(),
                provider: kind,
                locator,
                field,
                consumers: request.service().map(str::to_owned).into_iter().collect(),
                fingerprint: fingerprint_hex(value),
                last_updated: Utc::now(),
            })
            .await;
    }

    /// Derive the `DoNotReuse` flag for a request.
    ///
    /// An explicit reuse label equal to the literal `"false"` forces
    /// single-use; otherwise names matching the marker heuristic are
    /// single-use.
    fn should_not_reuse(&self, request: &SecretRequest) -> bool {
        let label = request
            .label(self.provider.kind().reuse_label())
            .or_else(|| request.label("reuse"));
        if let Some(value) = label {
            if value.eq_ignore_ascii_case("false") {
                return true;
            }
        }

        NO_REUSE_MARKERS.iter().any(|marker| request.secret_name.contains(marker))
    }

    /// Cancel the rotation loop, join it, and close the provider.
    pub async fn stop(&self) {
        self.rotation_cancel.cancel();
        if let Some(handle) = self.rotation_handle.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Rotation task terminated abnormally");
            }
        }
        if let Err(err) = self.provider.close().await {
            warn!(error = %err, "Error closing provider");
        }
        info!("Secrets driver stopped");
    }
}
