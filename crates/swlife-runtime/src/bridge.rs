//! Per-tab update notification bridge.
//!
//! Update-available signals from the lifecycle observer ask the active worker
//! to broadcast an [`UpdateMessage`](swlife_core::UpdateMessage) to every tab.
//! Messages the worker posts directly only advance the state: they have
//! already been delivered. Both paths go through one [`UpdateBridge`], so a
//! deployment is announced at most once per tab.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use swlife_core::{
    BridgeAction, BridgeState, DeploymentDescriptor, LifecycleSignal, UpdateBridge, UpdateTrigger,
    WorkerMessage,
};
use swlife_platform::WorkerHost;

pub struct NotificationBridge {
    host: Arc<dyn WorkerHost>,
    bridge: UpdateBridge,
    state_tx: watch::Sender<BridgeState>,
}

impl NotificationBridge {
    pub fn new(host: Arc<dyn WorkerHost>) -> (Self, watch::Receiver<BridgeState>) {
        let (state_tx, state_rx) = watch::channel(BridgeState::Idle);
        (
            Self {
                host,
                bridge: UpdateBridge::new(),
                state_tx,
            },
            state_rx,
        )
    }

    /// Consume both trigger paths until cancelled or both sources close.
    pub async fn run(
        mut self,
        mut signals: mpsc::Receiver<LifecycleSignal>,
        mut messages: broadcast::Receiver<WorkerMessage>,
        cancel: CancellationToken,
    ) {
        let mut signals_open = true;
        let mut messages_open = true;

        while signals_open || messages_open {
            tokio::select! {
                () = cancel.cancelled() => break,
                signal = signals.recv(), if signals_open => match signal {
                    Some(LifecycleSignal::UpdateAvailable(deployment)) => {
                        self.on_update_available(&deployment, UpdateTrigger::Lifecycle);
                    }
                    Some(other) => tracing::trace!(?other, "bridge: lifecycle signal ignored"),
                    None => signals_open = false,
                },
                result = messages.recv(), if messages_open => match result {
                    Ok(WorkerMessage::Updated(message)) => {
                        self.on_update_available(&message.descriptor(), UpdateTrigger::WorkerMessage);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "bridge lagged behind worker messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => messages_open = false,
                },
            }
        }
    }

    fn on_update_available(&mut self, deployment: &DeploymentDescriptor, trigger: UpdateTrigger) {
        let action = self.bridge.on_update_available(deployment, trigger);
        self.state_tx.send_replace(self.bridge.state().clone());

        let BridgeAction::Broadcast(message) = action else {
            tracing::debug!(
                deployment_id = %deployment.deployment_id,
                ?trigger,
                "update already announced, suppressed"
            );
            return;
        };
        if trigger == UpdateTrigger::WorkerMessage {
            tracing::info!(
                deployment_id = %deployment.deployment_id,
                "update announced by worker"
            );
            return;
        }

        match self.host.post_to_clients(&message) {
            Ok(reached) => tracing::info!(
                deployment_id = %message.deployment_id,
                reached,
                "update broadcast requested"
            ),
            Err(e) => tracing::warn!(
                deployment_id = %message.deployment_id,
                "update broadcast failed: {e}"
            ),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
