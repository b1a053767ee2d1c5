//! Rotation engine: change detection and orchestrator secret swapping.
//!
//! Each tick snapshots the tracking registry and asks the provider whether
//! any tracked secret changed upstream. A detected change swaps the Swarm
//! secret object without dropping consumers:
//!
//! 1. create a replacement secret object carrying the new bytes,
//! 2. rewire every consuming service to the replacement (name and id),
//! 3. retire the old object only after all services moved,
//! 4. record the new fingerprint only after the swap succeeded.
//!
//! Any mid-flight failure rolls the replacement back, leaving consumers on
//! the old object; the unchanged fingerprint makes the next tick retry.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{Error, Result};
use crate::orchestrator::OrchestratorClient;
use crate::providers::SecretsProvider;
use crate::registry::{fingerprint_hex, SecretRegistry, TrackedSecret};

/// Deadline for workload list/update calls, which touch every service.
const WORKLOAD_DEADLINE: Duration = Duration::from_secs(60);

/// Background engine driving secret rotation.
pub struct RotationEngine {
    registry: Arc<SecretRegistry>,
    provider: Arc<dyn SecretsProvider>,
    orchestrator: Arc<dyn OrchestratorClient>,
    interval: Duration,
    call_timeout: Duration,
}

impl RotationEngine {
    pub fn new(
        registry: Arc<SecretRegistry>,
        provider: Arc<dyn SecretsProvider>,
        orchestrator: Arc<dyn OrchestratorClient>,
        interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self { registry, provider, orchestrator, interval, call_timeout }
    }

    /// Tick loop; returns when the token is cancelled. Never crashes the
    /// daemon: every failure is per-record and logged.
    pub async fn run(self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "Secret rotation loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Secret rotation loop stopped");
                    return;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    /// One pass over the registry. Rotations run serially to bound
    /// orchestrator load and avoid self-conflicting service updates.
    pub async fn tick(&self) {
        let records = self.registry.snapshot().await;
        if records.is_empty() {
            debug!("No secrets to monitor");
            return;
        }

        debug!(count = records.len(), "Checking tracked secrets for changes");
        for record in records {
            if !self.has_changed(&record).await {
                continue;
            }
            info!(secret = %record.orch_secret_name, "Detected change in secret");
            if let Err(err) = self.rotate(&record).await {
                // Transient faults recover on the next tick by themselves;
                // permanent ones need an operator and log louder.
                if err.is_transient() {
                    warn!(
                        secret = %record.orch_secret_name,
                        provider = %record.provider,
                        error = %err,
                        "Rotation failed; retrying next tick"
                    );
                } else {
                    error!(
                        secret = %record.orch_secret_name,
                        provider = %record.provider,
                        error = %err,
                        "Failed to rotate secret"
                    );
                }
            }
        }
    }

    /// Provider change check. Errors (including timeouts) are logged and
    /// treated as "no change" so transient faults never trigger rotations.
    async fn has_changed(&self, record: &TrackedSecret) -> bool {
        match tokio::time::timeout(self.call_timeout, self.provider.check_changed(record)).await {
            Ok(Ok(changed)) => changed,
            Ok(Err(err)) if err.is_transient() => {
                warn!(
                    secret = %record.orch_secret_name,
                    error = %err,
                    "Transient failure checking secret for changes"
                );
                false
            }
            Ok(Err(err)) => {
                error!(
                    secret = %record.orch_secret_name,
                    error = %err,
                    "Error checking secret for changes"
                );
                false
            }
            Err(_) => {
                warn!(secret = %record.orch_secret_name, "Timed out checking secret for changes");
                false
            }
        }
    }

    /// Fetch the new value and swap the orchestrator secret. The registry
    /// fingerprint moves only after the swap fully succeeds.
    pub async fn rotate(&self, record: &TrackedSecret) -> Result<()> {
        info!(secret = %record.orch_secret_name, "Starting rotation");

        let value = tokio::time::timeout(
            self.call_timeout,
            self.provider.fetch_at(&record.locator, &record.field),
        )
        .await
        .map_err(|_| Error::timeout("provider fetch"))??;

        self.swap_secret(record, &value).await?;
        self.registry
            .record_rotation(&record.orch_secret_name, fingerprint_hex(&value))
            .await;

        info!(secret = %record.orch_secret_name, "Successfully rotated secret");
        Ok(())
    }

    /// Atomic swap: a consumer's reference always points at a live secret
    /// object, before, during, and after.
    async fn swap_secret(&self, record: &TrackedSecret, value: &[u8]) -> Result<()> {
        let name = record.orch_secret_name.as_str();

        let secrets = tokio::time::timeout(self.call_timeout, self.orchestrator.list_secrets())
            .await
            .map_err(|_| Error::timeout("secret list"))??;
        let existing = secrets
            .into_iter()
            .find(|secret| secret.name == name)
            .ok_or_else(|| Error::rotation_failed(name, "secret not found in orchestrator"))?;

        let new_name = format!("{}-{}", name, unix_nanos());
        let new_id = tokio::time::timeout(
            self.call_timeout,
            self.orchestrator.create_secret(&new_name, &existing.labels, value),
        )
        .await
        .map_err(|_| Error::timeout("secret create"))??;
        info!(secret = %name, new_secret = %new_name, id = %new_id, "Created new secret version");

        if let Err(err) = self.rewire_consumers(record, name, &new_name, &new_id).await {
            // Roll back: drop the orphaned replacement so consumers stay on
            // the old object and the next tick can retry cleanly.
            if let Err(cleanup) = self.delete_secret(&new_id).await {
                warn!(
                    id = %new_id,
                    error = %cleanup,
                    "Failed to remove new secret version after failed update"
                );
            }
            return Err(err);
        }

        // The new version is live everywhere; losing the old object is not
        // fatal.
        if let Err(err) = self.delete_secret(&existing.id).await {
            warn!(id = %existing.id, error = %err, "Failed to remove old secret version");
        }

        Ok(())
    }

    async fn delete_secret(&self, id: &str) -> Result<()> {
        tokio::time::timeout(self.call_timeout, self.orchestrator.delete_secret(id))
            .await
            .map_err(|_| Error::timeout("secret delete"))?
    }

    /// Rewrite every workload reference from `old_name` to the new object,
    /// preserving mount path, mode, uid, and gid.
    async fn rewire_consumers(
        &self,
        record: &TrackedSecret,
        old_name: &str,
        new_name: &str,
        new_id: &str,
    ) -> Result<()> {
        let workloads = tokio::time::timeout(WORKLOAD_DEADLINE, self.orchestrator.list_workloads())
            .await
            .map_err(|_| Error::timeout("workload list"))??;

        let rotated_label = record.provider.rotated_label();
        let stamp = Utc::now().timestamp().to_string();
        let mut updated = Vec::new();

        for workload in workloads {
            let mut spec = workload.spec;
            let mut needs_update = false;

            for attachment in &mut spec.secrets {
                if attachment.secret_name == old_name {
                    attachment.secret_name = new_name.to_string();
                    attachment.secret_id = new_id.to_string();
                    needs_update = true;
                }
            }
            if !needs_update {
                continue;
            }

            // Stamp a label so the orchestrator rolls a new task set even if
            // it considers the spec otherwise unchanged.
            spec.labels.insert(rotated_label.clone(), stamp.clone());

            let workload_name = spec.name.clone();
            let warnings = tokio::time::timeout(
                WORKLOAD_DEADLINE,
                self.orchestrator.update_workload(&workload.id, workload.version, spec),
            )
            .await
            .map_err(|_| Error::timeout("workload update"))?
            .map_err(|err| {
                Error::rotation_failed(
                    old_name,
                    format!("failed to update workload {}: {}", workload_name, err),
                )
            })?;

            if !warnings.is_empty() {
                warn!(workload = %workload_name, ?warnings, "Workload update warnings");
            }
            updated.push(workload_name);
        }

        if !updated.is_empty() {
            info!(
                secret = %new_name,
                workloads = ?updated,
                "Updated workloads to new secret version"
            );
        }
        Ok(())
    }
}

/// Nanosecond timestamp used to version replacement secret names.
fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default()
}
