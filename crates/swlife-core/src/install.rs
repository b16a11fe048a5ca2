//! Install-prompt state machine.
//!
//! `NoPrompt → PromptDeferred → {Installed | NoPrompt}`. The machine is
//! generic over the platform's deferred prompt handle so it stays free of
//! IO; the runtime supplies the real handle type.
//!
//! Banner visibility invariant: visible iff a live handle exists, the page is
//! not already installed, and no dismissal record is within its cooldown.

use serde::{Deserialize, Serialize};

use crate::types::DisplayMode;

/// Cooldown after an explicit in-app banner dismissal (7 days).
pub const DISMISSAL_COOLDOWN_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Persisted record of the last explicit banner dismissal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissalRecord {
    pub timestamp_ms: i64,
}

impl DismissalRecord {
    pub fn at(timestamp_ms: i64) -> Self {
        Self { timestamp_ms }
    }

    pub fn is_active(&self, now_ms: i64, cooldown_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) < cooldown_ms
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPromptState {
    #[default]
    NoPrompt,
    PromptDeferred,
    Installed,
}

/// User's answer to the native install prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptOutcome {
    Accepted,
    Dismissed,
}

/// Platform and UI inputs to the machine.
#[derive(Debug)]
pub enum InstallEvent<H> {
    /// Native "before install" signal; default UI already prevented.
    BeforeInstallPrompt(H),
    /// Platform reports the app was installed through any channel.
    AppInstalled,
    /// Explicit in-app close of the install banner.
    BannerClosed { now_ms: i64 },
}

#[derive(Debug)]
pub struct InstallPromptMachine<H> {
    state: InstallPromptState,
    handle: Option<H>,
    prompt_in_flight: bool,
    dismissal: Option<DismissalRecord>,
    cooldown_ms: i64,
}

impl<H> InstallPromptMachine<H> {
    /// Start-up: an installed display mode starts directly in `Installed`.
    pub fn new(
        display_mode: DisplayMode,
        dismissal: Option<DismissalRecord>,
        cooldown_ms: i64,
    ) -> Self {
        let state = if display_mode.is_installed() {
            InstallPromptState::Installed
        } else {
            InstallPromptState::NoPrompt
        };
        Self {
            state,
            handle: None,
            prompt_in_flight: false,
            dismissal,
            cooldown_ms,
        }
    }

    pub fn state(&self) -> InstallPromptState {
        self.state
    }

    pub fn dismissal(&self) -> Option<DismissalRecord> {
        self.dismissal
    }

    pub fn has_live_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub fn prompt_in_flight(&self) -> bool {
        self.prompt_in_flight
    }

    pub fn banner_visible(&self, now_ms: i64) -> bool {
        self.state == InstallPromptState::PromptDeferred
            && self.handle.is_some()
            && !self
                .dismissal
                .is_some_and(|d| d.is_active(now_ms, self.cooldown_ms))
    }

    /// Apply one event and return the resulting state.
    ///
    /// `BannerClosed` stores the dismissal record; the caller persists it.
    pub fn handle_event(&mut self, event: InstallEvent<H>) -> InstallPromptState {
        match event {
            InstallEvent::BeforeInstallPrompt(handle) => {
                if self.state != InstallPromptState::Installed {
                    // A newer handle silently replaces an unconsumed one.
                    self.handle = Some(handle);
                    self.state = InstallPromptState::PromptDeferred;
                }
            }
            InstallEvent::AppInstalled => {
                self.handle = None;
                self.state = InstallPromptState::Installed;
            }
            InstallEvent::BannerClosed { now_ms } => {
                self.dismissal = Some(DismissalRecord::at(now_ms));
            }
        }
        self.state
    }

    /// Take the deferred handle to show the native prompt.
    ///
    /// Returns `None` outside `PromptDeferred` or when the handle was already
    /// consumed. A handle can be prompted only once.
    pub fn begin_install(&mut self) -> Option<H> {
        if self.state != InstallPromptState::PromptDeferred {
            return None;
        }
        let handle = self.handle.take()?;
        self.prompt_in_flight = true;
        Some(handle)
    }

    /// Record the user's answer to a prompt started by [`begin_install`].
    ///
    /// [`begin_install`]: Self::begin_install
    pub fn finish_install(&mut self, outcome: Option<PromptOutcome>) -> InstallPromptState {
        self.prompt_in_flight = false;
        if self.state == InstallPromptState::Installed {
            return self.state;
        }
        self.state = match outcome {
            Some(PromptOutcome::Accepted) => {
                self.handle = None;
                InstallPromptState::Installed
            }
            // Dismissed or failed: the used handle is gone. A handle that
            // arrived while the prompt was open keeps the prompt deferred.
            Some(PromptOutcome::Dismissed) | None => {
                if self.handle.is_some() {
                    InstallPromptState::PromptDeferred
                } else {
                    InstallPromptState::NoPrompt
                }
            }
        };
        self.state
    }
}

// ─── Tests ────────────────────────────────────────────────────────
