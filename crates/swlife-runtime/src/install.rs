//! Install-prompt controller: defers the native install signal, exposes
//! `install()`, and suppresses the in-app banner after an explicit close.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;

use swlife_core::{
    DisplayMode, InstallEvent, InstallPromptMachine, InstallPromptState, PromptOutcome,
};
use swlife_platform::{KeyValueStore, NativeInstallPrompt, PlatformError, load_dismissal, save_dismissal};

use crate::clock::WallClock;
use crate::surface::{SharedSurface, render_install_banner, with_surface};

/// Result of [`InstallController::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallResult {
    Accepted,
    Dismissed,
    /// No live handle, handle already consumed, or the prompt failed.
    Unavailable,
}

type PromptHandle = Box<dyn NativeInstallPrompt>;

pub struct InstallController {
    machine: Mutex<InstallPromptMachine<PromptHandle>>,
    store: Arc<dyn KeyValueStore>,
    key: String,
    clock: WallClock,
    surface: SharedSurface,
    state_tx: watch::Sender<InstallPromptState>,
    visible_tx: watch::Sender<bool>,
}

impl InstallController {
    /// Start-up: read the dismissal record once and check the display mode.
    pub fn new(
        display_mode: DisplayMode,
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        cooldown_ms: i64,
        clock: WallClock,
        surface: SharedSurface,
    ) -> Self {
        let key = key.into();
        let dismissal = load_dismissal(&*store, &key);
        let machine = InstallPromptMachine::new(display_mode, dismissal, cooldown_ms);
        let (state_tx, _) = watch::channel(machine.state());
        let (visible_tx, _) = watch::channel(false);
        tracing::debug!(
            ?display_mode,
            state = ?machine.state(),
            dismissed_at = dismissal.map(|d| d.timestamp_ms),
            "install controller started"
        );
        Self {
            machine: Mutex::new(machine),
            store,
            key,
            clock,
            surface,
            state_tx,
            visible_tx,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InstallPromptMachine<PromptHandle>> {
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Native "before install" signal. The default UI is considered prevented
    /// once the handle is retained here.
    pub fn on_before_install_prompt(&self, handle: PromptHandle) {
        let state = self.lock().handle_event(InstallEvent::BeforeInstallPrompt(handle));
        tracing::debug!(?state, "install prompt deferred");
        self.publish();
    }

    /// The app was installed through any channel.
    pub fn on_app_installed(&self) {
        self.lock().handle_event(InstallEvent::AppInstalled);
        tracing::info!("app installed");
        self.publish();
    }

    /// Show the native prompt and wait for the user's choice.
    pub async fn install(&self) -> InstallResult {
        let Some(handle) = self.lock().begin_install() else {
            tracing::debug!("install() with no live prompt handle");
            return InstallResult::Unavailable;
        };
        self.publish();

        let choice = match handle.prompt() {
            Ok(rx) => rx.await.ok(),
            Err(e) => {
                tracing::warn!("install prompt failed: {e}");
                None
            }
        };

        self.lock().finish_install(choice);
        self.publish();
        match choice {
            Some(PromptOutcome::Accepted) => {
                tracing::info!("install prompt accepted");
                InstallResult::Accepted
            }
            Some(PromptOutcome::Dismissed) => {
                tracing::info!("install prompt dismissed");
                InstallResult::Dismissed
            }
            None => InstallResult::Unavailable,
        }
    }

    /// Explicit in-app close of the install banner: starts the cooldown.
    pub fn close_banner(&self) -> Result<(), PlatformError> {
        let now_ms = (self.clock)();
        let record = {
            let mut machine = self.lock();
            machine.handle_event(InstallEvent::BannerClosed { now_ms });
            machine.dismissal()
        };
        self.publish();
        match record {
            Some(record) => save_dismissal(&*self.store, &self.key, record),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> InstallPromptState {
        self.lock().state()
    }

    pub fn banner_visible(&self) -> bool {
        *self.visible_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<InstallPromptState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_banner(&self) -> watch::Receiver<bool> {
        self.visible_tx.subscribe()
    }

    fn publish(&self) {
        let now_ms = (self.clock)();
        let (state, visible) = {
            let machine = self.lock();
            (machine.state(), machine.banner_visible(now_ms))
        };
        self.state_tx.send_if_modified(|s| replace_if_changed(s, state));
        if self.visible_tx.send_if_modified(|v| replace_if_changed(v, visible)) {
            with_surface(&self.surface, |s| render_install_banner(s, visible));
        }
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use swlife_core::DISMISSAL_COOLDOWN_MS;
    use swlife_platform::{DISMISSAL_KEY, MemoryStore, SimulatedPrompt};

    use crate::clock::fixed_clock;
    use crate::surface::{INSTALL_BANNER_ELEMENT_ID, MemorySurface};

    const NOW: i64 = 1_760_000_000_000;

    fn controller_with(
        display_mode: DisplayMode,
        store: Arc<MemoryStore>,
        now_ms: i64,
    ) -> (InstallController, Arc<Mutex<MemorySurface>>) {
        let surface = MemorySurface::shared();
        let ctl = InstallController::new(
            display_mode,
            store,
            DISMISSAL_KEY,
            DISMISSAL_COOLDOWN_MS,
            fixed_clock(now_ms),
            surface.clone(),
        );
        (ctl, surface)
    }

    fn controller() -> InstallController {
        controller_with(DisplayMode::Browser, Arc::new(MemoryStore::new()), NOW).0
    }

    fn deferred() -> PromptHandle {
        Box::new(SimulatedPrompt::new().0)
    }

    #[tokio::test]
    async fn install_without_prompt_is_unavailable() {
        let ctl = controller();
        assert_eq!(ctl.install().await, InstallResult::Unavailable);
        assert_eq!(ctl.state(), InstallPromptState::NoPrompt);
    }

    #[tokio::test]
    async fn accepted_prompt_installs_and_hides_banner() {
        let (ctl, surface) = controller_with(DisplayMode::Browser, Arc::new(MemoryStore::new()), NOW);
        ctl.on_before_install_prompt(Box::new(SimulatedPrompt::answered(PromptOutcome::Accepted)));
        assert!(ctl.banner_visible());
        assert_eq!(surface.lock().expect("lock").count(INSTALL_BANNER_ELEMENT_ID), 1);

        assert_eq!(ctl.install().await, InstallResult::Accepted);
        assert_eq!(ctl.state(), InstallPromptState::Installed);
        assert!(!ctl.banner_visible());
        assert_eq!(surface.lock().expect("lock").count(INSTALL_BANNER_ELEMENT_ID), 0);
    }

    #[tokio::test]
    async fn native_dismissal_does_not_start_cooldown() {
        let store = Arc::new(MemoryStore::new());
        let (ctl, _) = controller_with(DisplayMode::Browser, store.clone(), NOW);
        ctl.on_before_install_prompt(Box::new(SimulatedPrompt::answered(PromptOutcome::Dismissed)));

        assert_eq!(ctl.install().await, InstallResult::Dismissed);
        assert_eq!(ctl.state(), InstallPromptState::NoPrompt);
        assert_eq!(store.get(DISMISSAL_KEY).expect("get"), None);

        // Handle was consumed.
        assert_eq!(ctl.install().await, InstallResult::Unavailable);

        ctl.on_before_install_prompt(deferred());
        assert_eq!(ctl.state(), InstallPromptState::PromptDeferred);
        assert!(ctl.banner_visible());
    }

    #[tokio::test]
    async fn expired_handle_is_unavailable() {
        let ctl = controller();
        ctl.on_before_install_prompt(Box::new(SimulatedPrompt::expired()));
        assert_eq!(ctl.install().await, InstallResult::Unavailable);
        assert_eq!(ctl.state(), InstallPromptState::NoPrompt);
    }

    #[tokio::test]
    async fn abandoned_prompt_is_unavailable() {
        let ctl = controller();
        let (prompt, responder) = SimulatedPrompt::new();
        ctl.on_before_install_prompt(Box::new(prompt));
        drop(responder);
        assert_eq!(ctl.install().await, InstallResult::Unavailable);
    }

    #[tokio::test]
    async fn answer_arrives_while_prompt_is_open() {
        let ctl = Arc::new(controller());
        let (prompt, responder) = SimulatedPrompt::new();
        ctl.on_before_install_prompt(Box::new(prompt));

        let pending = tokio::spawn({
            let ctl = Arc::clone(&ctl);
            async move { ctl.install().await }
        });
        tokio::task::yield_now().await;
        assert!(responder.was_shown());
        assert!(!ctl.banner_visible(), "banner hidden while the modal is open");

        responder.respond(PromptOutcome::Accepted);
        assert_eq!(pending.await.expect("join"), InstallResult::Accepted);
    }

    #[test]
    fn close_banner_persists_now_and_suppresses_next_controller() {
        let store = Arc::new(MemoryStore::new());
        let (ctl, _) = controller_with(DisplayMode::Browser, store.clone(), NOW);
        ctl.on_before_install_prompt(deferred());
        assert!(ctl.banner_visible());

        ctl.close_banner().expect("close");
        assert!(!ctl.banner_visible());
        assert_eq!(
            store.get(DISMISSAL_KEY).expect("get"),
            Some(NOW.to_string())
        );

        let (next, _) = controller_with(DisplayMode::Browser, store.clone(), NOW + 1);
        next.on_before_install_prompt(deferred());
        assert_eq!(next.state(), InstallPromptState::PromptDeferred);
        assert!(!next.banner_visible());
    }

    #[test]
    fn expired_dismissal_does_not_suppress() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(DISMISSAL_KEY, &(NOW - DISMISSAL_COOLDOWN_MS - 1).to_string())
            .expect("set");
        let (ctl, _) = controller_with(DisplayMode::Browser, store, NOW);
        ctl.on_before_install_prompt(deferred());
        assert!(ctl.banner_visible());
    }

    #[test]
    fn corrupt_dismissal_counts_as_none() {
        let store = Arc::new(MemoryStore::new());
        store.set(DISMISSAL_KEY, "{not a number").expect("set");
        let (ctl, _) = controller_with(DisplayMode::Browser, store, NOW);
        ctl.on_before_install_prompt(deferred());
        assert!(ctl.banner_visible());
    }

    #[test]
    fn standalone_never_shows_install_ui() {
        let (ctl, surface) =
            controller_with(DisplayMode::Standalone, Arc::new(MemoryStore::new()), NOW);
        assert_eq!(ctl.state(), InstallPromptState::Installed);
        ctl.on_before_install_prompt(deferred());
        assert_eq!(ctl.state(), InstallPromptState::Installed);
        assert!(!ctl.banner_visible());
        assert!(surface.lock().expect("lock").nodes().is_empty());
    }

    #[test]
    fn app_installed_hides_banner_immediately() {
        let ctl = controller();
        let mut visible = ctl.subscribe_banner();
        ctl.on_before_install_prompt(deferred());
        assert!(*visible.borrow_and_update());

        ctl.on_app_installed();
        assert!(visible.has_changed().expect("open"));
        assert!(!*visible.borrow_and_update());
        assert_eq!(*ctl.subscribe_state().borrow(), InstallPromptState::Installed);
    }

    #[test]
    fn newer_handle_replaces_unconsumed_one() {
        let ctl = controller();
        let mut state = ctl.subscribe_state();
        ctl.on_before_install_prompt(deferred());
        assert!(state.has_changed().expect("open"));
        state.borrow_and_update();

        ctl.on_before_install_prompt(deferred());
        assert!(!state.has_changed().expect("open"), "same state, no notification");
        assert!(ctl.banner_visible());
    }
}
