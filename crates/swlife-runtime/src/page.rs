//! One tab's lifecycle controllers, started on page load and released on
//! teardown.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use swlife_core::{BridgeState, ConnectivitySignal, DisplayMode, WorkerLifecycleState};
use swlife_platform::{KeyValueStore, NativeInstallPrompt, WorkerHost, WorkerRegistration};

use crate::bridge::NotificationBridge;
use crate::clock::WallClock;
use crate::config::LifecycleConfig;
use crate::connectivity::ConnectivityObserver;
use crate::install::InstallController;
use crate::presenter::{PageReloader, PresenterHandle, PresenterTask};
use crate::registration::{Registrar, run_lifecycle_observer, run_recheck_loop};
use crate::surface::SharedSurface;

/// Platform events delivered to a page, as one typed union.
#[derive(Debug)]
pub enum PageSignal {
    BeforeInstallPrompt(Box<dyn NativeInstallPrompt>),
    AppInstalled,
    Online,
    Offline,
}

/// Collaborators a page is started with.
pub struct PageDeps {
    pub host: Arc<dyn WorkerHost>,
    pub store: Arc<dyn KeyValueStore>,
    pub reloader: Arc<dyn PageReloader>,
    pub surface: SharedSurface,
    pub display_mode: DisplayMode,
    pub online: bool,
    pub clock: WallClock,
}

pub struct PageSession {
    registrar: Arc<Registrar>,
    presenter: PresenterHandle,
    install: Arc<InstallController>,
    connectivity: ConnectivityObserver,
    bridge_state: watch::Receiver<BridgeState>,
    worker_state: watch::Receiver<WorkerLifecycleState>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PageSession {
    /// Page load. Must run inside a tokio runtime.
    ///
    /// Subscriptions are taken before registering so the lifecycle events
    /// fired by the registration itself are observed.
    pub fn start(config: &LifecycleConfig, deps: PageDeps) -> Self {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        let lifecycle_events = deps.host.lifecycle_events();
        let bridge_messages = deps.host.client_messages();
        let presenter_messages = deps.host.client_messages();

        let (signal_tx, signal_rx) = mpsc::channel(16);
        let (worker_tx, worker_state) = watch::channel(WorkerLifecycleState::None);
        tasks.push(tokio::spawn(run_lifecycle_observer(
            lifecycle_events,
            signal_tx,
            worker_tx,
            cancel.clone(),
        )));

        let (bridge, bridge_state) = NotificationBridge::new(Arc::clone(&deps.host));
        tasks.push(tokio::spawn(bridge.run(
            signal_rx,
            bridge_messages,
            cancel.clone(),
        )));

        let (presenter_task, presenter) = PresenterTask::new(
            config.environment,
            config.presenter_timing(),
            presenter_messages,
            Arc::clone(&deps.surface),
            deps.reloader,
        );
        tasks.push(tokio::spawn(presenter_task.run(cancel.clone())));

        let registrar = Arc::new(Registrar::new(
            Arc::clone(&deps.host),
            config.script_url.clone(),
            config.scope.clone(),
        ));
        if registrar.register().is_some() {
            tasks.push(tokio::spawn(run_recheck_loop(
                Arc::clone(&registrar),
                config.recheck_interval,
                cancel.clone(),
            )));
        }

        let install = Arc::new(InstallController::new(
            deps.display_mode,
            deps.store,
            config.dismissal_key.clone(),
            config.dismissal_cooldown_ms(),
            deps.clock,
            deps.surface,
        ));
        let connectivity = ConnectivityObserver::new(deps.online);

        tracing::debug!(
            environment = %config.environment,
            offline_support = registrar.offline_support(),
            "page session started"
        );

        Self {
            registrar,
            presenter,
            install,
            connectivity,
            bridge_state,
            worker_state,
            cancel,
            tasks,
        }
    }

    pub fn dispatch(&self, signal: PageSignal) {
        match signal {
            PageSignal::BeforeInstallPrompt(handle) => self.install.on_before_install_prompt(handle),
            PageSignal::AppInstalled => self.install.on_app_installed(),
            PageSignal::Online => {
                self.connectivity.apply(ConnectivitySignal::WentOnline);
            }
            PageSignal::Offline => {
                self.connectivity.apply(ConnectivitySignal::WentOffline);
            }
        }
    }

    pub fn registration(&self) -> Option<WorkerRegistration> {
        self.registrar.registration()
    }

    pub fn offline_support(&self) -> bool {
        self.registrar.offline_support()
    }

    pub fn bridge_state(&self) -> BridgeState {
        self.bridge_state.borrow().clone()
    }

    pub fn subscribe_bridge(&self) -> watch::Receiver<BridgeState> {
        self.bridge_state.clone()
    }

    pub fn worker_state(&self) -> WorkerLifecycleState {
        *self.worker_state.borrow()
    }

    pub fn presenter(&self) -> &PresenterHandle {
        &self.presenter
    }

    pub fn install(&self) -> &Arc<InstallController> {
        &self.install
    }

    pub fn connectivity(&self) -> &ConnectivityObserver {
        &self.connectivity
    }

    /// Page teardown: stop every timer and listener and wait for them.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!("page task ended abnormally: {e}");
            }
        }
        tracing::debug!("page session stopped");
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─── Tests ────────────────────────────────────────────────────────
