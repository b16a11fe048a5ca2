//! Update notification bridge state machine (one per tab).
//!
//! `Idle` → update available → ask the active worker to broadcast →
//! `Notified`. Two independent paths feed the bridge (the lifecycle
//! observation and a direct worker message); both are deduplicated by
//! `deployment_id` so a single deployment is announced once per tab.

use serde::{Deserialize, Serialize};

use crate::types::{DeploymentDescriptor, UpdateMessage};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BridgeState {
    #[default]
    Idle,
    Notified { deployment_id: String },
}

/// Which path observed the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTrigger {
    /// A new worker reached `installed` while another one controls the page.
    Lifecycle,
    /// The worker itself announced the new deployment.
    WorkerMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeAction {
    /// Ask the active worker to post this message to every client.
    Broadcast(UpdateMessage),
    /// Already announced for this deployment.
    Suppressed,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBridge {
    state: BridgeState,
    notified_via: Option<UpdateTrigger>,
}

impl UpdateBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    /// Path that produced the current notification.
    pub fn notified_via(&self) -> Option<UpdateTrigger> {
        self.notified_via
    }

    /// Handle an update-available condition from either trigger path.
    pub fn on_update_available(
        &mut self,
        descriptor: &DeploymentDescriptor,
        trigger: UpdateTrigger,
    ) -> BridgeAction {
        if let BridgeState::Notified { deployment_id } = &self.state {
            if *deployment_id == descriptor.deployment_id {
                return BridgeAction::Suppressed;
            }
        }
        self.state = BridgeState::Notified {
            deployment_id: descriptor.deployment_id.clone(),
        };
        self.notified_via = Some(trigger);
        BridgeAction::Broadcast(UpdateMessage::for_deployment(descriptor))
    }
}

// ─── Tests ────────────────────────────────────────────────────────
