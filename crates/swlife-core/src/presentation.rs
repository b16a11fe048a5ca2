//! Update presentation state machine (one per tab).
//!
//! Development reloads automatically after a short delay. Production shows a
//! dismissible banner that hides itself after a timeout. The banner is a
//! tagged value rendered declaratively by [`render_banner`]; a repeated
//! message replaces its content, it never stacks a second banner.

use serde::{Deserialize, Serialize};

use crate::types::{Environment, UpdateMessage};

/// Auto-hide timeout for the production banner (milliseconds).
pub const DEFAULT_BANNER_TIMEOUT_MS: i64 = 10_000;

/// Delay before the automatic development reload (milliseconds).
pub const DEFAULT_DEV_RELOAD_DELAY_MS: i64 = 1_500;

/// Stable element id of the rendered update banner.
pub const BANNER_ELEMENT_ID: &str = "sw-update-banner";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "banner", rename_all = "snake_case")]
pub enum UpdateBanner {
    #[default]
    Hidden,
    Visible {
        message: String,
        deployment_id: String,
        shown_at_ms: i64,
    },
}

impl UpdateBanner {
    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Visible { .. })
    }
}

/// Inputs to the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterEvent {
    Message { message: UpdateMessage, now_ms: i64 },
    /// User clicked the banner's reload action.
    Activate,
    /// User closed the banner.
    Dismiss,
    /// Clock tick used to expire the banner.
    Tick { now_ms: i64 },
}

/// Side effect the runtime must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterEffect {
    None,
    /// Reload the page after `after_ms` without user interaction.
    ScheduleReload { after_ms: i64 },
    /// Banner became visible; hide it at `hide_at_ms` unless acted on.
    ShowBanner { hide_at_ms: i64 },
    /// Visible banner content replaced; auto-hide deadline restarted.
    ReplaceBanner { hide_at_ms: i64 },
    HideBanner,
    ReloadNow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenterTiming {
    pub banner_timeout_ms: i64,
    pub dev_reload_delay_ms: i64,
}

impl Default for PresenterTiming {
    fn default() -> Self {
        Self {
            banner_timeout_ms: DEFAULT_BANNER_TIMEOUT_MS,
            dev_reload_delay_ms: DEFAULT_DEV_RELOAD_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdatePresenter {
    environment: Environment,
    timing: PresenterTiming,
    banner: UpdateBanner,
    reload_scheduled: bool,
}

impl UpdatePresenter {
    pub fn new(environment: Environment, timing: PresenterTiming) -> Self {
        Self {
            environment,
            timing,
            banner: UpdateBanner::Hidden,
            reload_scheduled: false,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn banner(&self) -> &UpdateBanner {
        &self.banner
    }

    pub fn reload_scheduled(&self) -> bool {
        self.reload_scheduled
    }

    pub fn handle(&mut self, event: PresenterEvent) -> PresenterEffect {
        match event {
            PresenterEvent::Message { message, now_ms } => self.on_message(message, now_ms),
            PresenterEvent::Activate => {
                if !self.banner.is_visible() {
                    return PresenterEffect::None;
                }
                self.banner = UpdateBanner::Hidden;
                self.reload_scheduled = true;
                PresenterEffect::ReloadNow
            }
            PresenterEvent::Dismiss => self.hide(),
            PresenterEvent::Tick { now_ms } => match &self.banner {
                UpdateBanner::Visible { shown_at_ms, .. }
                    if now_ms.saturating_sub(*shown_at_ms) >= self.timing.banner_timeout_ms =>
                {
                    self.hide()
                }
                _ => PresenterEffect::None,
            },
        }
    }

    fn on_message(&mut self, message: UpdateMessage, now_ms: i64) -> PresenterEffect {
        match self.environment {
            Environment::Development => {
                if self.reload_scheduled {
                    return PresenterEffect::None;
                }
                self.reload_scheduled = true;
                PresenterEffect::ScheduleReload {
                    after_ms: self.timing.dev_reload_delay_ms,
                }
            }
            Environment::Production => {
                let was_visible = self.banner.is_visible();
                self.banner = UpdateBanner::Visible {
                    message: message.message,
                    deployment_id: message.deployment_id,
                    shown_at_ms: now_ms,
                };
                let hide_at_ms = now_ms.saturating_add(self.timing.banner_timeout_ms);
                if was_visible {
                    PresenterEffect::ReplaceBanner { hide_at_ms }
                } else {
                    PresenterEffect::ShowBanner { hide_at_ms }
                }
            }
        }
    }

    fn hide(&mut self) -> PresenterEffect {
        if !self.banner.is_visible() {
            return PresenterEffect::None;
        }
        self.banner = UpdateBanner::Hidden;
        PresenterEffect::HideBanner
    }
}

// ─── Rendering ────────────────────────────────────────────────────

/// Declarative description of the banner element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BannerView {
    pub element_id: &'static str,
    pub text: String,
    pub action_label: &'static str,
    pub dismiss_label: &'static str,
}

/// Render the banner state. At most one element exists by construction.
pub fn render_banner(banner: &UpdateBanner) -> Option<BannerView> {
    match banner {
        UpdateBanner::Hidden => None,
        UpdateBanner::Visible { message, .. } => Some(BannerView {
            element_id: BANNER_ELEMENT_ID,
            text: message.clone(),
            action_label: "Reload",
            dismiss_label: "Dismiss",
        }),
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str) -> UpdateMessage {
        UpdateMessage {
            deployment_id: id.into(),
            build_timestamp: 1,
            message: format!("update {id}"),
        }
    }

    fn prod() -> UpdatePresenter {
        UpdatePresenter::new(Environment::Production, PresenterTiming::default())
    }

    #[test]
    fn development_schedules_single_reload() {
        let mut p = UpdatePresenter::new(Environment::Development, PresenterTiming::default());
        let first = p.handle(PresenterEvent::Message {
            message: msg("v2"),
            now_ms: 0,
        });
        assert_eq!(
            first,
            PresenterEffect::ScheduleReload {
                after_ms: DEFAULT_DEV_RELOAD_DELAY_MS
            }
        );
        let second = p.handle(PresenterEvent::Message {
            message: msg("v3"),
            now_ms: 10,
        });
        assert_eq!(second, PresenterEffect::None);
        assert!(!p.banner().is_visible());
    }

    #[test]
    fn production_shows_banner() {
        let mut p = prod();
        let effect = p.handle(PresenterEvent::Message {
            message: msg("v2"),
            now_ms: 1_000,
        });
        assert_eq!(effect, PresenterEffect::ShowBanner { hide_at_ms: 11_000 });
        let view = render_banner(p.banner()).expect("visible");
        assert_eq!(view.element_id, BANNER_ELEMENT_ID);
        assert_eq!(view.text, "update v2");
    }

    #[test]
    fn duplicate_message_replaces_banner() {
        let mut p = prod();
        p.handle(PresenterEvent::Message {
            message: msg("v2"),
            now_ms: 0,
        });
        let effect = p.handle(PresenterEvent::Message {
            message: msg("v2"),
            now_ms: 4_000,
        });
        assert_eq!(effect, PresenterEffect::ReplaceBanner { hide_at_ms: 14_000 });
        assert_eq!(render_banner(p.banner()).into_iter().count(), 1);
    }

    #[test]
    fn auto_hide_after_timeout() {
        let mut p = prod();
        p.handle(PresenterEvent::Message {
            message: msg("v2"),
            now_ms: 0,
        });
        assert_eq!(p.handle(PresenterEvent::Tick { now_ms: 9_999 }), PresenterEffect::None);
        assert_eq!(
            p.handle(PresenterEvent::Tick { now_ms: 10_000 }),
            PresenterEffect::HideBanner
        );
        assert!(render_banner(p.banner()).is_none());
    }

    #[test]
    fn activate_reloads() {
        let mut p = prod();
        p.handle(PresenterEvent::Message {
            message: msg("v2"),
            now_ms: 0,
        });
        assert_eq!(p.handle(PresenterEvent::Activate), PresenterEffect::ReloadNow);
        assert!(p.reload_scheduled());
        assert!(!p.banner().is_visible());
    }

    #[test]
    fn activate_without_banner_is_noop() {
        let mut p = prod();
        assert_eq!(p.handle(PresenterEvent::Activate), PresenterEffect::None);
    }

    #[test]
    fn dismissal_does_not_suppress_next_deployment() {
        let mut p = prod();
        p.handle(PresenterEvent::Message {
            message: msg("v2"),
            now_ms: 0,
        });
        assert_eq!(p.handle(PresenterEvent::Dismiss), PresenterEffect::HideBanner);
        assert_eq!(p.handle(PresenterEvent::Dismiss), PresenterEffect::None);
        let effect = p.handle(PresenterEvent::Message {
            message: msg("v3"),
            now_ms: 100,
        });
        assert!(matches!(effect, PresenterEffect::ShowBanner { .. }));
    }

    #[test]
    fn stale_tick_after_replace_does_not_hide() {
        let mut p = prod();
        p.handle(PresenterEvent::Message {
            message: msg("v2"),
            now_ms: 0,
        });
        p.handle(PresenterEvent::Message {
            message: msg("v3"),
            now_ms: 8_000,
        });
        // The deadline armed by the first message has passed, the second has not.
        assert_eq!(p.handle(PresenterEvent::Tick { now_ms: 10_000 }), PresenterEffect::None);
        assert!(p.banner().is_visible());
    }
}
