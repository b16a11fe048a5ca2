//! In-memory browser: serves worker artifacts, runs their lifecycle, and
//! relays worker → client messages. Backs the `simulate` command and tests.
//!
//! Behaviour follows the platform rules the controllers rely on:
//! - registration is idempotent per scope;
//! - an update check compares the fetched artifact byte-for-byte;
//! - a new artifact installs and then waits while another worker controls
//!   the page, or activates immediately on first install;
//! - a reload swaps the waiting worker in atomically.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use swlife_core::fingerprint::read_stamp;
use swlife_core::{
    BridgeAction, DeploymentDescriptor, UpdateBridge, UpdateMessage, UpdateTrigger,
    WorkerLifecycleState, WorkerMessage,
};

use crate::error::PlatformError;
use crate::worker::{
    LifecycleEvent, UpdateCheck, WorkerHost, WorkerRegistration, check_scope,
};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct ServedArtifact {
    source: String,
    allowed_scope: Option<String>,
}

#[derive(Debug, Clone)]
struct WorkerSlot {
    source: String,
    deployment: DeploymentDescriptor,
}

#[derive(Debug)]
struct RegistrationRecord {
    registration: WorkerRegistration,
    active: Option<WorkerSlot>,
    waiting: Option<WorkerSlot>,
}

#[derive(Debug, Default)]
struct BrowserInner {
    served: BTreeMap<String, ServedArtifact>,
    registrations: BTreeMap<String, RegistrationRecord>,
    next_registration_id: u64,
    unstamped_counter: u64,
    supported: bool,
    reject_registration: Option<String>,
    pending_network_failures: u32,
    update_checks: u64,
    announce_on_install: bool,
    /// Broadcast dedup of the active worker, reset when a new worker activates.
    worker_bridge: UpdateBridge,
}

/// Simulated worker container shared by every tab of one browser instance.
#[derive(Debug)]
pub struct SimulatedBrowser {
    inner: Mutex<BrowserInner>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
    clients_tx: broadcast::Sender<WorkerMessage>,
}

impl Default for SimulatedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBrowser {
    pub fn new() -> Self {
        let (lifecycle_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (clients_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(BrowserInner {
                supported: true,
                ..BrowserInner::default()
            }),
            lifecycle_tx,
            clients_tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrowserInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish `source` at `script_url` (a deployment).
    pub fn serve(&self, script_url: &str, source: impl Into<String>) {
        let mut inner = self.lock();
        let allowed_scope = inner
            .served
            .get(script_url)
            .and_then(|a| a.allowed_scope.clone());
        inner.served.insert(
            script_url.to_string(),
            ServedArtifact {
                source: source.into(),
                allowed_scope,
            },
        );
    }

    /// Send a `Service-Worker-Allowed` header with `script_url`.
    pub fn allow_scope(&self, script_url: &str, scope: &str) {
        let mut inner = self.lock();
        if let Some(artifact) = inner.served.get_mut(script_url) {
            artifact.allowed_scope = Some(scope.to_string());
        }
    }

    pub fn set_supported(&self, supported: bool) {
        self.lock().supported = supported;
    }

    /// Reject subsequent registrations with `reason`.
    pub fn reject_registrations(&self, reason: impl Into<String>) {
        self.lock().reject_registration = Some(reason.into());
    }

    /// Fail the next `count` update checks with a network error.
    pub fn fail_next_updates(&self, count: u32) {
        self.lock().pending_network_failures = count;
    }

    /// Have a newly installed worker announce itself to clients directly,
    /// in addition to the page observing its lifecycle.
    pub fn announce_on_install(&self, enabled: bool) {
        self.lock().announce_on_install = enabled;
    }

    pub fn update_checks(&self) -> u64 {
        self.lock().update_checks
    }

    pub fn registration_count(&self) -> usize {
        self.lock().registrations.len()
    }

    pub fn waiting(&self) -> Option<DeploymentDescriptor> {
        self.lock()
            .registrations
            .values()
            .find_map(|r| r.waiting.as_ref().map(|w| w.deployment.clone()))
    }

    /// Full page reload: a waiting worker replaces the active one atomically.
    /// Returns the newly activated deployment, if any.
    pub fn reload(&self) -> Option<DeploymentDescriptor> {
        let mut inner = self.lock();
        let mut activated = None;
        for record in inner.registrations.values_mut() {
            let Some(next) = record.waiting.take() else {
                continue;
            };
            if let Some(old) = record.active.take() {
                self.emit(&old.deployment, WorkerLifecycleState::Redundant, true);
            }
            self.emit(&next.deployment, WorkerLifecycleState::Activating, true);
            self.emit(&next.deployment, WorkerLifecycleState::Activated, true);
            activated = Some(next.deployment.clone());
            record.active = Some(next);
        }
        if activated.is_some() {
            inner.worker_bridge = UpdateBridge::new();
        }
        activated
    }

    fn emit(
        &self,
        deployment: &DeploymentDescriptor,
        state: WorkerLifecycleState,
        has_controller: bool,
    ) {
        // No subscribers is fine: pages may not be listening yet.
        let _ = self.lifecycle_tx.send(LifecycleEvent {
            deployment: deployment.clone(),
            state,
            has_controller,
        });
    }

    fn deployment_of(inner: &mut BrowserInner, source: &str) -> DeploymentDescriptor {
        read_stamp(source).unwrap_or_else(|_| {
            inner.unstamped_counter += 1;
            DeploymentDescriptor::new(format!("unstamped-{}", inner.unstamped_counter), 0)
        })
    }

    /// Install `source` into `scope`. Caller holds the lock.
    fn install(
        &self,
        inner: &mut BrowserInner,
        scope: &str,
        source: String,
    ) -> DeploymentDescriptor {
        let deployment = Self::deployment_of(inner, &source);
        let announce = inner.announce_on_install;

        let Some(record) = inner.registrations.get_mut(scope) else {
            return deployment;
        };
        let has_controller = record.active.is_some();

        if let Some(superseded) = record.waiting.take() {
            self.emit(&superseded.deployment, WorkerLifecycleState::Redundant, has_controller);
        }

        self.emit(&deployment, WorkerLifecycleState::Installing, has_controller);
        let slot = WorkerSlot {
            source,
            deployment: deployment.clone(),
        };

        if has_controller {
            record.waiting = Some(slot);
            if announce {
                let message = UpdateMessage::for_deployment(&deployment);
                Self::broadcast(inner, &self.clients_tx, &message);
            }
            self.emit(&deployment, WorkerLifecycleState::Installed, true);
        } else {
            self.emit(&deployment, WorkerLifecycleState::Installed, false);
            self.emit(&deployment, WorkerLifecycleState::Activating, false);
            record.active = Some(slot);
            self.emit(&deployment, WorkerLifecycleState::Activated, false);
        }
        deployment
    }

    fn broadcast(
        inner: &mut BrowserInner,
        clients_tx: &broadcast::Sender<WorkerMessage>,
        message: &UpdateMessage,
    ) -> usize {
        match inner
            .worker_bridge
            .on_update_available(&message.descriptor(), UpdateTrigger::WorkerMessage)
        {
            BridgeAction::Broadcast(_) => clients_tx
                .send(WorkerMessage::Updated(message.clone()))
                .unwrap_or(0),
            BridgeAction::Suppressed => 0,
        }
    }
}

impl WorkerHost for SimulatedBrowser {
    fn register(
        &self,
        script_url: &str,
        scope: &str,
    ) -> Result<WorkerRegistration, PlatformError> {
        let mut inner = self.lock();
        if !inner.supported {
            return Err(PlatformError::Unsupported);
        }
        if let Some(reason) = &inner.reject_registration {
            return Err(PlatformError::RegistrationRejected(reason.clone()));
        }
        let artifact = inner.served.get(script_url).cloned().ok_or_else(|| {
            PlatformError::RegistrationRejected(format!("{script_url} returned 404"))
        })?;
        check_scope(script_url, scope, artifact.allowed_scope.as_deref())?;

        if let Some(existing) = inner.registrations.get(scope) {
            if existing.registration.script_url == script_url {
                return Ok(existing.registration.clone());
            }
        }

        inner.next_registration_id += 1;
        let registration = WorkerRegistration {
            id: inner.next_registration_id,
            scope: scope.to_string(),
            script_url: script_url.to_string(),
        };
        let previous = inner.registrations.insert(
            scope.to_string(),
            RegistrationRecord {
                registration: registration.clone(),
                active: None,
                waiting: None,
            },
        );
        // A different script for the same scope keeps the running worker.
        if let Some(previous) = previous {
            if let Some(record) = inner.registrations.get_mut(scope) {
                record.active = previous.active;
            }
        }
        self.install(&mut inner, scope, artifact.source);
        Ok(registration)
    }

    fn update(&self, registration: &WorkerRegistration) -> Result<UpdateCheck, PlatformError> {
        let mut inner = self.lock();
        inner.update_checks += 1;
        if inner.pending_network_failures > 0 {
            inner.pending_network_failures -= 1;
            return Err(PlatformError::Network(format!(
                "fetch {} failed",
                registration.script_url
            )));
        }
        let fetched = inner
            .served
            .get(&registration.script_url)
            .map(|a| a.source.clone())
            .ok_or_else(|| {
                PlatformError::Network(format!("{} returned 404", registration.script_url))
            })?;
        let record = inner
            .registrations
            .get(&registration.scope)
            .ok_or_else(|| PlatformError::RegistrationRejected("registration gone".to_string()))?;

        let unchanged = [&record.active, &record.waiting]
            .into_iter()
            .flatten()
            .any(|slot| slot.source.as_bytes() == fetched.as_bytes());
        if unchanged {
            return Ok(UpdateCheck::NoChange);
        }

        let deployment = self.install(&mut inner, &registration.scope, fetched);
        Ok(UpdateCheck::Found(deployment))
    }

    fn controller(&self) -> Option<DeploymentDescriptor> {
        self.lock()
            .registrations
            .values()
            .find_map(|r| r.active.as_ref().map(|a| a.deployment.clone()))
    }

    fn lifecycle_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle_tx.subscribe()
    }

    fn post_to_clients(&self, message: &UpdateMessage) -> Result<usize, PlatformError> {
        let mut inner = self.lock();
        let has_active = inner.registrations.values().any(|r| r.active.is_some());
        if !has_active {
            return Err(PlatformError::NoActiveWorker);
        }
        Ok(Self::broadcast(&mut inner, &self.clients_tx, message))
    }

    fn client_messages(&self) -> broadcast::Receiver<WorkerMessage> {
        self.clients_tx.subscribe()
    }
}
