//! Per-tab update presentation: development auto-reload or a production
//! banner with activate / dismiss / auto-hide.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use swlife_core::{
    Environment, PresenterEffect, PresenterEvent, PresenterTiming, UpdateBanner, UpdatePresenter,
    WorkerMessage,
};

use crate::clock::MonotonicMs;
use crate::surface::{SharedSurface, render_update_banner, with_surface};

/// Full page reload. The platform swaps a waiting worker in on reload.
pub trait PageReloader: Send + Sync {
    fn reload(&self);
}

/// Reloader that only counts calls.
#[derive(Debug, Default)]
pub struct CountingReloader {
    count: AtomicUsize,
}

impl CountingReloader {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl PageReloader for CountingReloader {
    fn reload(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterCommand {
    Activate,
    Dismiss,
}

/// UI-facing side of a running presenter.
#[derive(Debug, Clone)]
pub struct PresenterHandle {
    commands: mpsc::Sender<PresenterCommand>,
    banner: watch::Receiver<UpdateBanner>,
    received: Arc<AtomicUsize>,
}

impl PresenterHandle {
    /// User clicked the banner's reload action.
    pub async fn activate(&self) -> bool {
        self.commands.send(PresenterCommand::Activate).await.is_ok()
    }

    pub async fn dismiss(&self) -> bool {
        self.commands.send(PresenterCommand::Dismiss).await.is_ok()
    }

    pub fn banner(&self) -> UpdateBanner {
        self.banner.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UpdateBanner> {
        self.banner.clone()
    }

    /// Update messages delivered to this tab so far.
    pub fn messages_received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }
}

pub struct PresenterTask {
    presenter: UpdatePresenter,
    messages: broadcast::Receiver<WorkerMessage>,
    commands: mpsc::Receiver<PresenterCommand>,
    banner_tx: watch::Sender<UpdateBanner>,
    received: Arc<AtomicUsize>,
    surface: SharedSurface,
    reloader: Arc<dyn PageReloader>,
    clock: MonotonicMs,
    hide_at: Option<Instant>,
    reload_at: Option<Instant>,
}

impl PresenterTask {
    pub fn new(
        environment: Environment,
        timing: PresenterTiming,
        messages: broadcast::Receiver<WorkerMessage>,
        surface: SharedSurface,
        reloader: Arc<dyn PageReloader>,
    ) -> (Self, PresenterHandle) {
        let (commands_tx, commands) = mpsc::channel(8);
        let (banner_tx, banner_rx) = watch::channel(UpdateBanner::Hidden);
        let received = Arc::new(AtomicUsize::new(0));
        let task = Self {
            presenter: UpdatePresenter::new(environment, timing),
            messages,
            commands,
            banner_tx,
            received: Arc::clone(&received),
            surface,
            reloader,
            clock: MonotonicMs::start(),
            hide_at: None,
            reload_at: None,
        };
        let handle = PresenterHandle {
            commands: commands_tx,
            banner: banner_rx,
            received,
        };
        (task, handle)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                result = self.messages.recv() => match result {
                    Ok(WorkerMessage::Updated(message)) => {
                        self.received.fetch_add(1, Ordering::SeqCst);
                        tracing::debug!(
                            deployment_id = %message.deployment_id,
                            environment = %self.presenter.environment(),
                            "update message received"
                        );
                        let now_ms = self.clock.now_ms();
                        self.step(PresenterEvent::Message { message, now_ms });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "presenter lagged behind worker messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(command) = self.commands.recv() => {
                    let event = match command {
                        PresenterCommand::Activate => PresenterEvent::Activate,
                        PresenterCommand::Dismiss => PresenterEvent::Dismiss,
                    };
                    self.step(event);
                }
                () = sleep_until_opt(self.hide_at) => {
                    self.hide_at = None;
                    let now_ms = self.clock.now_ms();
                    self.step(PresenterEvent::Tick { now_ms });
                }
                () = sleep_until_opt(self.reload_at) => {
                    self.reload_at = None;
                    tracing::info!("development reload");
                    self.reloader.reload();
                }
            }
        }
        tracing::debug!("presenter stopped");
    }

    fn step(&mut self, event: PresenterEvent) {
        match self.presenter.handle(event) {
            PresenterEffect::None => return,
            PresenterEffect::ScheduleReload { after_ms } => {
                let delay = Duration::from_millis(u64::try_from(after_ms).unwrap_or(0));
                self.reload_at = Some(Instant::now() + delay);
                tracing::info!(delay_ms = after_ms, "reload scheduled");
            }
            PresenterEffect::ShowBanner { hide_at_ms } | PresenterEffect::ReplaceBanner { hide_at_ms } => {
                self.hide_at = Some(self.clock.instant_at(hide_at_ms));
            }
            PresenterEffect::HideBanner => {
                self.hide_at = None;
            }
            PresenterEffect::ReloadNow => {
                self.hide_at = None;
                tracing::info!("update activated, reloading");
                self.reloader.reload();
            }
        }

        let banner = self.presenter.banner().clone();
        with_surface(&self.surface, |s| render_update_banner(s, &banner));
        self.banner_tx.send_replace(banner);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use swlife_core::presentation::BANNER_ELEMENT_ID;
    use swlife_core::{DeploymentDescriptor, UpdateMessage};

    use crate::surface::MemorySurface;

    struct Fixture {
        worker: broadcast::Sender<WorkerMessage>,
        handle: PresenterHandle,
        surface: Arc<Mutex<MemorySurface>>,
        reloader: Arc<CountingReloader>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(environment: Environment) -> Fixture {
        let (worker, messages) = broadcast::channel(16);
        let surface = MemorySurface::shared();
        let reloader = Arc::new(CountingReloader::default());
        let (task, handle) = PresenterTask::new(
            environment,
            PresenterTiming::default(),
            messages,
            surface.clone(),
            reloader.clone(),
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(task.run(cancel.clone()));
        Fixture {
            worker,
            handle,
            surface,
            reloader,
            cancel,
            task,
        }
    }

    fn post(fx: &Fixture, id: &str) {
        let msg = UpdateMessage::for_deployment(&DeploymentDescriptor::new(id, 1));
        fx.worker.send(WorkerMessage::Updated(msg)).expect("send");
    }

    fn banner_nodes(fx: &Fixture) -> usize {
        fx.surface.lock().expect("lock").count(BANNER_ELEMENT_ID)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn development_reloads_after_delay() {
        let fx = start(Environment::Development);
        post(&fx, "v2");
        settle().await;
        assert_eq!(fx.reloader.count(), 0);
        assert_eq!(banner_nodes(&fx), 0, "no banner in development");

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(fx.reloader.count(), 1);

        post(&fx, "v3");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fx.reloader.count(), 1, "one reload per page");

        fx.cancel.cancel();
        fx.task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn same_deployment_twice_renders_one_banner() {
        let fx = start(Environment::Production);
        post(&fx, "v2");
        post(&fx, "v2");
        settle().await;

        assert_eq!(banner_nodes(&fx), 1);
        assert_eq!(fx.handle.messages_received(), 2);
        assert!(fx.handle.banner().is_visible());

        fx.cancel.cancel();
        fx.task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn banner_auto_hides_after_timeout() {
        let fx = start(Environment::Production);
        post(&fx, "v2");
        settle().await;
        assert!(fx.handle.banner().is_visible());

        tokio::time::sleep(Duration::from_millis(9_000)).await;
        assert!(fx.handle.banner().is_visible());

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(fx.handle.banner(), UpdateBanner::Hidden);
        assert_eq!(banner_nodes(&fx), 0);
        assert_eq!(fx.reloader.count(), 0);

        fx.cancel.cancel();
        fx.task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn new_deployment_replaces_banner_and_restarts_timer() {
        let fx = start(Environment::Production);
        post(&fx, "v2");
        settle().await;
        tokio::time::sleep(Duration::from_secs(8)).await;

        post(&fx, "v3");
        settle().await;
        tokio::time::sleep(Duration::from_secs(8)).await;

        match fx.handle.banner() {
            UpdateBanner::Visible { deployment_id, .. } => assert_eq!(deployment_id, "v3"),
            UpdateBanner::Hidden => panic!("banner hidden before its restarted timeout"),
        }
        assert_eq!(banner_nodes(&fx), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fx.handle.banner(), UpdateBanner::Hidden);

        fx.cancel.cancel();
        fx.task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn activate_reloads_and_dismiss_does_not() {
        let fx = start(Environment::Production);
        post(&fx, "v2");
        settle().await;
        assert!(fx.handle.dismiss().await);
        settle().await;
        assert_eq!(banner_nodes(&fx), 0);
        assert_eq!(fx.reloader.count(), 0);

        // Dismissal does not suppress the next deployment.
        post(&fx, "v3");
        settle().await;
        assert_eq!(banner_nodes(&fx), 1);

        assert!(fx.handle.activate().await);
        settle().await;
        assert_eq!(fx.reloader.count(), 1);
        assert_eq!(banner_nodes(&fx), 0);

        fx.cancel.cancel();
        fx.task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn activate_without_banner_is_noop() {
        let fx = start(Environment::Production);
        assert!(fx.handle.activate().await);
        settle().await;
        assert_eq!(fx.reloader.count(), 0);

        fx.cancel.cancel();
        fx.task.await.expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn banner_subscription_sees_transitions() {
        let fx = start(Environment::Production);
        let mut rx = fx.handle.subscribe();
        post(&fx, "v2");
        rx.changed().await.expect("changed");
        assert!(rx.borrow_and_update().is_visible());

        fx.cancel.cancel();
        fx.task.await.expect("join");
    }
}
