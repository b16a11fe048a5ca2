//! End-to-end lifecycle run against the simulated browser: first install,
//! redeployments found by the periodic re-check, per-tab presentation,
//! activation reload, install prompt and connectivity transitions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use swlife_core::fingerprint::stamp_source;
use swlife_core::presentation::BANNER_ELEMENT_ID;
use swlife_core::{
    BridgeState, DeploymentDescriptor, DisplayMode, Environment, PromptOutcome,
    WorkerLifecycleState,
};
use swlife_platform::{KeyValueStore, MemoryStore, SimulatedBrowser, SimulatedPrompt, WorkerHost};

use crate::clock::{WallClock, system_clock};
use crate::config::LifecycleConfig;
use crate::fingerprint::generate_descriptor;
use crate::page::{PageDeps, PageSession, PageSignal};
use crate::presenter::PageReloader;
use crate::surface::MemorySurface;

/// Worker artifact served by the simulated origin before stamping.
pub const WORKER_TEMPLATE: &str = "\
const DEPLOYMENT_ID = \"__DEPLOYMENT_ID__\";
const BUILD_TIMESTAMP = 0;

self.addEventListener('fetch', (event) => event.respondWith(fetch(event.request)));
";

const POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub environment: Environment,
    pub tabs: usize,
    pub deployments: Vec<DeploymentDescriptor>,
    /// Update messages delivered to each tab across its reloads.
    pub messages_per_tab: Vec<usize>,
    pub reloads: usize,
    pub transcript: Vec<String>,
}

/// Reload of one simulated tab: swaps in a waiting worker, if any.
struct BrowserReloader {
    browser: Arc<SimulatedBrowser>,
    reloads: AtomicUsize,
}

impl PageReloader for BrowserReloader {
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if let Some(activated) = self.browser.reload() {
            tracing::info!(
                deployment_id = %activated.deployment_id,
                "reload activated waiting worker"
            );
        }
    }
}

struct SimTab {
    index: usize,
    session: PageSession,
    surface: Arc<Mutex<MemorySurface>>,
    reloader: Arc<BrowserReloader>,
    handled_reloads: usize,
    delivered_before_reload: usize,
}

impl SimTab {
    fn delivered(&self) -> usize {
        self.delivered_before_reload + self.session.presenter().messages_received()
    }

    fn banner_nodes(&self) -> usize {
        self.surface
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .count(BANNER_ELEMENT_ID)
    }

    fn reloads(&self) -> usize {
        self.reloader.reloads.load(Ordering::SeqCst)
    }
}

struct Simulation {
    config: LifecycleConfig,
    browser: Arc<SimulatedBrowser>,
    store: Arc<MemoryStore>,
    clock: WallClock,
    transcript: Vec<String>,
}

impl Simulation {
    fn note(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!("{line}");
        self.transcript.push(line);
    }

    fn open_session(
        &self,
        surface: &Arc<Mutex<MemorySurface>>,
        reloader: &Arc<BrowserReloader>,
    ) -> PageSession {
        PageSession::start(
            &self.config,
            PageDeps {
                host: self.browser.clone(),
                store: self.store.clone(),
                reloader: reloader.clone(),
                surface: surface.clone(),
                display_mode: DisplayMode::Browser,
                online: true,
                clock: Arc::clone(&self.clock),
            },
        )
    }

    fn open_tab(&self, index: usize) -> SimTab {
        let surface = MemorySurface::shared();
        let reloader = Arc::new(BrowserReloader {
            browser: Arc::clone(&self.browser),
            reloads: AtomicUsize::new(0),
        });
        let session = self.open_session(&surface, &reloader);
        SimTab {
            index,
            session,
            surface,
            reloader,
            handled_reloads: 0,
            delivered_before_reload: 0,
        }
    }

    /// A reloaded tab is a new page: tear the old session down and start over.
    async fn restart_reloaded(&mut self, tabs: &mut [SimTab]) {
        for tab in tabs.iter_mut() {
            let reloads = tab.reloads();
            if reloads == tab.handled_reloads {
                continue;
            }
            tab.handled_reloads = reloads;
            tab.delivered_before_reload = tab.delivered();
            tab.surface = MemorySurface::shared();
            let fresh = self.open_session(&tab.surface, &tab.reloader);
            let old = std::mem::replace(&mut tab.session, fresh);
            old.shutdown().await;
            self.note(format!("[tab {}] reloaded", tab.index));
        }
    }

    fn deploy(&mut self) -> anyhow::Result<DeploymentDescriptor> {
        let descriptor = generate_descriptor((self.clock)());
        let source = stamp_source(WORKER_TEMPLATE, &descriptor)?;
        self.browser.serve(&self.config.script_url, source);
        self.note(format!(
            "deployed {} (build {})",
            descriptor.deployment_id, descriptor.build_timestamp
        ));
        Ok(descriptor)
    }

    fn wait_limit(&self) -> Duration {
        self.config.recheck_interval * 2 + self.config.dev_reload_delay + Duration::from_secs(5)
    }
}

async fn wait_until(
    what: &str,
    limit: Duration,
    mut ready: impl FnMut() -> bool,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + limit;
    while !ready() {
        if Instant::now() >= deadline {
            anyhow::bail!("timed out after {limit:?} waiting for {what}");
        }
        tokio::time::sleep(POLL).await;
    }
    Ok(())
}

/// Run the whole lifecycle with `tabs` open pages and `deployments`
/// redeployments after the first install.
pub async fn run_simulation(
    config: LifecycleConfig,
    tabs: usize,
    deployments: usize,
) -> anyhow::Result<SimulationReport> {
    anyhow::ensure!(tabs > 0, "at least one tab is required");

    let mut sim = Simulation {
        config,
        browser: Arc::new(SimulatedBrowser::new()),
        store: Arc::new(MemoryStore::new()),
        clock: system_clock(),
        transcript: Vec::new(),
    };
    let environment = sim.config.environment;
    sim.note(format!(
        "environment {environment}, {tabs} tab(s), re-check every {:?}",
        sim.config.recheck_interval
    ));

    let first = sim.deploy()?;
    let mut open: Vec<SimTab> = (0..tabs).map(|i| sim.open_tab(i)).collect();
    let limit = sim.wait_limit();

    wait_until("first install", limit, || {
        open[0].session.worker_state() == WorkerLifecycleState::Activated
    })
    .await?;
    sim.note(format!(
        "[tab 0] first install of {} activated, no update prompt",
        first.deployment_id
    ));

    let mut history = vec![first];
    for round in 1..=deployments {
        let next = sim.deploy()?;
        let expected = BridgeState::Notified {
            deployment_id: next.deployment_id.clone(),
        };

        wait_until("every tab to be notified", limit, || {
            open.iter().all(|t| t.session.bridge_state() == expected)
        })
        .await?;

        match environment {
            Environment::Production => {
                wait_until("update banners", limit, || {
                    open.iter().all(|t| t.session.presenter().banner().is_visible())
                })
                .await?;
                for tab in &open {
                    sim.note(format!(
                        "[tab {}] banner shown for {} ({} node)",
                        tab.index,
                        next.deployment_id,
                        tab.banner_nodes()
                    ));
                }

                if open.len() > 1 && round % 2 == 1 {
                    open[1].session.presenter().dismiss().await;
                    sim.note("[tab 1] banner dismissed, no reload");
                }

                let before = open[0].reloads();
                open[0].session.presenter().activate().await;
                wait_until("activation reload", limit, || open[0].reloads() > before).await?;
                sim.note("[tab 0] banner activated");
            }
            Environment::Development => {
                wait_until("development reloads", limit, || {
                    open.iter().all(|t| t.reloads() > t.handled_reloads)
                })
                .await?;
                sim.note("every tab auto-reloaded after the development delay");
            }
        }

        sim.restart_reloaded(&mut open).await;
        let controller = sim.browser.controller();
        anyhow::ensure!(
            controller.as_ref() == Some(&next),
            "reload did not activate {}",
            next.deployment_id
        );
        sim.note(format!("{} now controls the page", next.deployment_id));
        history.push(next);
    }

    let probe_index = open.len();
    run_install_flow(&mut sim, &open[0], probe_index).await?;
    run_connectivity_flow(&mut sim, &open[0]);

    let messages_per_tab = open.iter().map(SimTab::delivered).collect();
    let reloads = open.iter().map(SimTab::reloads).sum();
    for tab in open {
        tab.session.shutdown().await;
    }
    sim.note("all pages closed");

    Ok(SimulationReport {
        environment,
        tabs,
        deployments: history,
        messages_per_tab,
        reloads,
        transcript: sim.transcript,
    })
}

async fn run_install_flow(
    sim: &mut Simulation,
    tab: &SimTab,
    probe_index: usize,
) -> anyhow::Result<()> {
    let install = Arc::clone(tab.session.install());

    tab.session.dispatch(PageSignal::BeforeInstallPrompt(Box::new(
        SimulatedPrompt::answered(PromptOutcome::Dismissed),
    )));
    sim.note(format!(
        "[tab 0] install prompt deferred, banner visible: {}",
        install.banner_visible()
    ));

    let result = install.install().await;
    sim.note(format!(
        "[tab 0] native prompt answered {result:?}, state {:?}",
        install.state()
    ));

    tab.session.dispatch(PageSignal::BeforeInstallPrompt(Box::new(
        SimulatedPrompt::answered(PromptOutcome::Accepted),
    )));
    install.close_banner()?;
    let stored = sim.store.get(&sim.config.dismissal_key)?;
    sim.note(format!(
        "[tab 0] install banner closed, dismissal record {}",
        stored.as_deref().unwrap_or("missing")
    ));

    // A page opened after the close reads the record at start-up.
    let probe = sim.open_tab(probe_index);
    probe
        .session
        .dispatch(PageSignal::BeforeInstallPrompt(Box::new(SimulatedPrompt::new().0)));
    sim.note(format!(
        "[tab {}] install banner visible during cooldown: {}",
        probe.index,
        probe.session.install().banner_visible()
    ));
    probe.session.shutdown().await;

    let result = install.install().await;
    sim.note(format!(
        "[tab 0] explicit install {result:?}, state {:?}",
        install.state()
    ));
    Ok(())
}

fn run_connectivity_flow(sim: &mut Simulation, tab: &SimTab) {
    for (signal, label) in [
        (PageSignal::Offline, "offline"),
        (PageSignal::Offline, "offline"),
        (PageSignal::Online, "online"),
    ] {
        let before = tab.session.connectivity().current();
        tab.session.dispatch(signal);
        let after = tab.session.connectivity().current();
        sim.note(format!(
            "[tab 0] {label} signal: {before:?} -> {after:?}{}",
            if before == after { " (no change)" } else { "" }
        ));
    }
}
