//! Shared test doubles: an in-memory secrets provider and an in-memory
//! orchestrator with failure injection and reference auditing.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use swarmgate::api::types::SecretRequest;
use swarmgate::config::AppConfig;
use swarmgate::driver::SecretsDriver;
use swarmgate::errors::{Error, Result};
use swarmgate::orchestrator::{
    OrchestratorClient, SecretAttachment, SecretObject, Workload, WorkloadSpec,
};
use swarmgate::providers::{extract, field_override, naming, ProviderKind, SecretsProvider};

/// In-memory provider backed by a mutable map of locator → payload bytes.
/// Uses flat (slash-joined) naming and the `aws_*` label vocabulary.
pub struct MockProvider {
    store: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { store: Mutex::new(HashMap::new()), failing: AtomicBool::new(false) })
    }

    /// Set or replace the payload stored at a locator.
    pub async fn put(&self, locator: &str, payload: &[u8]) {
        self.store.lock().await.insert(locator.to_string(), payload.to_vec());
    }

    pub async fn remove(&self, locator: &str) {
        self.store.lock().await.remove(locator);
    }

    /// Make every backend call fail with a transient error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    async fn read(&self, locator: &str) -> Result<Vec<u8>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::connection_failed("injected backend failure"));
        }
        self.store
            .lock()
            .await
            .get(locator)
            .cloned()
            .ok_or_else(|| Error::not_found(locator))
    }
}

#[async_trait]
impl SecretsProvider for MockProvider {
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
        let payload = self.read(&self.locate(request)).await?;
        extract::extract_value(&payload, request.label(self.kind().field_label()))
    }

    async fn fetch_at(&self, locator: &str, field: &str) -> Result<Vec<u8>> {
        let payload = self.read(locator).await?;
        extract::extract_value(&payload, field_override(field))
    }
}

#[derive(Default)]
struct OrchState {
    secrets: Vec<SecretObject>,
    workloads: Vec<Workload>,
    next_id: u64,
}

/// In-memory orchestrator recording every call and auditing that no
/// workload ever references a secret id that does not exist.
pub struct MockOrchestrator {
    state: Mutex<OrchState>,
    fail_workload_updates: AtomicBool,
    calls: std::sync::Mutex<Vec<String>>,
    violations: std::sync::Mutex<Vec<String>>,
}

impl MockOrchestrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(OrchState::default()),
            fail_workload_updates: AtomicBool::new(false),
            calls: std::sync::Mutex::new(Vec::new()),
            violations: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub async fn add_secret(&self, name: &str, labels: HashMap<String, String>) -> String {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = format!("sec-{}", state.next_id);
        state.secrets.push(SecretObject { id: id.clone(), name: name.to_string(), labels });
        id
    }

    pub async fn add_workload(&self, name: &str, secrets: Vec<SecretAttachment>) -> String {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = format!("svc-{}", state.next_id);
        state.workloads.push(Workload {
            id: id.clone(),
            version: 1,
            spec: WorkloadSpec { name: name.to_string(), labels: HashMap::new(), secrets },
        });
        id
    }

    pub fn set_fail_workload_updates(&self, failing: bool) {
        self.fail_workload_updates.store(failing, Ordering::SeqCst);
    }

    pub async fn secrets(&self) -> Vec<SecretObject> {
        self.state.lock().await.secrets.clone()
    }

    pub async fn workloads(&self) -> Vec<Workload> {
        self.state.lock().await.workloads.clone()
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Reference-integrity violations observed after any mutation. Empty for
    /// a correctly ordered rotation.
    pub async fn violations(&self) -> Vec<String> {
        self.violations.lock().unwrap().clone()
    }

    fn record_call(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn audit(&self, state: &OrchState) {
        for workload in &state.workloads {
            for attachment in &workload.spec.secrets {
                if !state.secrets.iter().any(|secret| secret.id == attachment.secret_id) {
                    self.violations.lock().unwrap().push(format!(
                        "workload {} references missing secret id {}",
                        workload.spec.name, attachment.secret_id
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl OrchestratorClient for MockOrchestrator {
    async fn list_secrets(&self) -> Result<Vec<SecretObject>> {
        self.record_call("list_secrets");
        Ok(self.state.lock().await.secrets.clone())
    }

    async fn create_secret(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
        _data: &[u8],
    ) -> Result<String> {
        self.record_call("create_secret");
        Ok(self.add_secret(name, labels.clone()).await)
    }

    async fn delete_secret(&self, id: &str) -> Result<()> {
        self.record_call("delete_secret");
        let mut state = self.state.lock().await;
        let before = state.secrets.len();
        state.secrets.retain(|secret| secret.id != id);
        if state.secrets.len() == before {
            return Err(Error::orchestrator(format!("no such secret: {}", id)));
        }
        self.audit(&state);
        Ok(())
    }

    async fn list_workloads(&self) -> Result<Vec<Workload>> {
        self.record_call("list_workloads");
        Ok(self.state.lock().await.workloads.clone())
    }

    async fn update_workload(
        &self,
        id: &str,
        version: u64,
        spec: WorkloadSpec,
    ) -> Result<Vec<String>> {
        self.record_call("update_workload");
        if self.fail_workload_updates.load(Ordering::SeqCst) {
            return Err(Error::orchestrator("injected update failure"));
        }

        let mut state = self.state.lock().await;
        let workload = state
            .workloads
            .iter_mut()
            .find(|workload| workload.id == id)
            .ok_or_else(|| Error::orchestrator(format!("no such workload: {}", id)))?;
        if workload.version != version {
            return Err(Error::orchestrator(format!(
                "version conflict for workload {}: have {}, got {}",
                id, workload.version, version
            )));
        }
        workload.spec = spec;
        workload.version += 1;
        self.audit(&state);
        Ok(Vec::new())
    }
}

/// Assemble a driver over the mocks. The background rotation loop is pushed
/// far into the future so tests drive ticks explicitly.
pub fn test_config(enable_rotation: bool) -> AppConfig {
    AppConfig {
        enable_rotation,
        rotation_interval: Duration::from_secs(3600),
        fetch_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn assemble_driver(
    provider: Arc<MockProvider>,
    orchestrator: Arc<MockOrchestrator>,
    enable_rotation: bool,
) -> SecretsDriver {
    SecretsDriver::assemble(
        test_config(enable_rotation),
        provider as Arc<dyn SecretsProvider>,
        orchestrator as Arc<dyn OrchestratorClient>,
    )
}
