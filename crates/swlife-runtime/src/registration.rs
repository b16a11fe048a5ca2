//! Background worker registration: one registration per page load, a
//! periodic explicit re-check, and lifecycle observation of new workers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use swlife_core::{LifecycleSignal, LifecycleTracker, WorkerLifecycleState};
use swlife_platform::{LifecycleEvent, PlatformError, UpdateCheck, WorkerHost, WorkerRegistration};

pub struct Registrar {
    host: Arc<dyn WorkerHost>,
    script_url: String,
    scope: String,
    registration: Mutex<Option<WorkerRegistration>>,
}

impl Registrar {
    pub fn new(
        host: Arc<dyn WorkerHost>,
        script_url: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            host,
            script_url: script_url.into(),
            scope: scope.into(),
            registration: Mutex::new(None),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<WorkerRegistration>> {
        self.registration.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the worker artifact. Failures are logged and yield `None`:
    /// the page keeps working without offline support.
    pub fn register(&self) -> Option<WorkerRegistration> {
        match self.host.register(&self.script_url, &self.scope) {
            Ok(registration) => {
                tracing::info!(
                    id = registration.id,
                    scope = %registration.scope,
                    script = %registration.script_url,
                    "worker registered"
                );
                *self.slot() = Some(registration.clone());
                Some(registration)
            }
            Err(e) => {
                tracing::warn!(
                    script = %self.script_url,
                    scope = %self.scope,
                    "worker registration failed, continuing without offline support: {e}"
                );
                None
            }
        }
    }

    pub fn registration(&self) -> Option<WorkerRegistration> {
        self.slot().clone()
    }

    pub fn offline_support(&self) -> bool {
        self.slot().is_some()
    }

    /// One explicit re-fetch of the artifact. `Ok(None)` when unregistered.
    pub fn check_for_update(&self) -> Result<Option<UpdateCheck>, PlatformError> {
        let Some(registration) = self.registration() else {
            return Ok(None);
        };
        self.host.update(&registration).map(Some)
    }
}

/// Periodic re-check. The first tick fires immediately after registration;
/// failures are retried at the next tick with no backoff.
pub async fn run_recheck_loop(
    registrar: Arc<Registrar>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match registrar.check_for_update() {
                    Ok(Some(UpdateCheck::Found(deployment))) => {
                        tracing::info!(
                            deployment_id = %deployment.deployment_id,
                            "re-check found a new worker artifact"
                        );
                    }
                    Ok(Some(UpdateCheck::NoChange)) | Ok(None) => {
                        tracing::trace!("re-check: artifact unchanged");
                    }
                    Err(e) => {
                        tracing::debug!("re-check failed, retrying next tick: {e}");
                    }
                }
            }
        }
    }
    tracing::debug!("re-check loop stopped");
}

/// Follow lifecycle transitions, publish the tracked state, and forward the
/// classified signals to the notification bridge.
pub async fn run_lifecycle_observer(
    mut events: broadcast::Receiver<LifecycleEvent>,
    signals: mpsc::Sender<LifecycleSignal>,
    state_tx: watch::Sender<WorkerLifecycleState>,
    cancel: CancellationToken,
) {
    let mut tracker = LifecycleTracker::new();

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            result = events.recv() => match result {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "lifecycle observer lagged, dropped events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        let signal = match tracker.observe(&event.deployment, event.state, event.has_controller) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(
                    deployment_id = %event.deployment.deployment_id,
                    "ignoring lifecycle event: {e}"
                );
                continue;
            }
        };
        state_tx.send_replace(tracker.state());
        tracing::debug!(
            deployment_id = %event.deployment.deployment_id,
            state = %event.state,
            has_controller = event.has_controller,
            "worker lifecycle transition"
        );

        if let Some(signal) = signal {
            if signals.send(signal).await.is_err() {
                break;
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use swlife_core::DeploymentDescriptor;
    use swlife_platform::SimulatedBrowser;

    fn artifact(id: &str) -> String {
        format!("const DEPLOYMENT_ID = \"{id}\";\nconst BUILD_TIMESTAMP = 7;\n")
    }

    fn browser_with(id: &str) -> Arc<SimulatedBrowser> {
        let browser = Arc::new(SimulatedBrowser::new());
        browser.serve("/sw.js", artifact(id));
        browser
    }

    #[test]
    fn register_twice_yields_same_registration() {
        let browser = browser_with("v1");
        let registrar = Registrar::new(browser.clone(), "/sw.js", "/");
        let a = registrar.register().expect("first");
        let b = registrar.register().expect("second");
        assert_eq!(a, b);
        assert_eq!(browser.registration_count(), 1);
        assert!(registrar.offline_support());
    }

    #[test]
    fn registration_failure_is_not_fatal() {
        let browser = browser_with("v1");
        browser.set_supported(false);
        let registrar = Registrar::new(browser, "/sw.js", "/");
        assert!(registrar.register().is_none());
        assert!(!registrar.offline_support());
        assert!(matches!(registrar.check_for_update(), Ok(None)));
    }

    #[test]
    fn scope_outside_script_directory_is_rejected() {
        let browser = Arc::new(SimulatedBrowser::new());
        browser.serve("/static/sw.js", artifact("v1"));
        let registrar = Registrar::new(browser.clone(), "/static/sw.js", "/");
        assert!(registrar.register().is_none());

        browser.allow_scope("/static/sw.js", "/");
        assert!(registrar.register().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn recheck_runs_immediately_then_periodically() {
        let browser = browser_with("v1");
        let registrar = Arc::new(Registrar::new(browser.clone(), "/sw.js", "/"));
        registrar.register().expect("register");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_recheck_loop(
            Arc::clone(&registrar),
            Duration::from_secs(60),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(browser.update_checks(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(browser.update_checks(), 2);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(browser.update_checks(), 4);

        cancel.cancel();
        task.await.expect("join");
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(browser.update_checks(), 4, "no ticks after teardown");
    }

    #[tokio::test(start_paused = true)]
    async fn recheck_failures_are_retried_next_tick() {
        let browser = browser_with("v1");
        let registrar = Arc::new(Registrar::new(browser.clone(), "/sw.js", "/"));
        registrar.register().expect("register");
        browser.fail_next_updates(2);
        browser.serve("/sw.js", artifact("v2"));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_recheck_loop(
            Arc::clone(&registrar),
            Duration::from_secs(60),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(browser.waiting().is_none(), "two failed checks");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(browser.waiting().map(|d| d.deployment_id), Some("v2".to_string()));

        cancel.cancel();
        task.await.expect("join");
    }

    #[tokio::test]
    async fn observer_classifies_first_install_and_update() {
        let browser = browser_with("v1");
        let events = browser.lifecycle_events();
        let (signal_tx, mut signal_rx) = mpsc::channel(8);
        let (state_tx, state_rx) = watch::channel(WorkerLifecycleState::None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_lifecycle_observer(events, signal_tx, state_tx, cancel.clone()));

        let registrar = Registrar::new(browser.clone(), "/sw.js", "/");
        registrar.register().expect("register");

        let v1 = DeploymentDescriptor::new("v1", 7);
        assert_eq!(signal_rx.recv().await, Some(LifecycleSignal::FirstInstall(v1.clone())));
        assert_eq!(signal_rx.recv().await, Some(LifecycleSignal::Activated(v1)));
        assert_eq!(*state_rx.borrow(), WorkerLifecycleState::Activated);

        browser.serve("/sw.js", artifact("v2"));
        registrar.check_for_update().expect("update");
        assert_eq!(
            signal_rx.recv().await,
            Some(LifecycleSignal::UpdateAvailable(DeploymentDescriptor::new("v2", 7)))
        );
        assert_eq!(*state_rx.borrow(), WorkerLifecycleState::Installed);

        cancel.cancel();
        task.await.expect("join");
    }
}
