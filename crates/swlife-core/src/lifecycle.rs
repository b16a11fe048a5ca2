//! Observation of a newly discovered worker's lifecycle.
//!
//! The platform drives every transition; this module only validates the
//! observed sequence and classifies the moment a new worker reaches
//! `installed` into a first install or an update.

use serde::{Deserialize, Serialize};

use crate::types::{DeploymentDescriptor, LifecycleError, WorkerLifecycleState};

/// What reaching `installed` means for the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallKind {
    /// No worker controlled the page before.
    FirstInstall,
    /// A different worker already controls the page.
    UpdateAvailable,
}

/// Classify an `installed` transition by whether a controller existed.
pub fn classify_installed(has_controller: bool) -> InstallKind {
    if has_controller {
        InstallKind::UpdateAvailable
    } else {
        InstallKind::FirstInstall
    }
}

/// Signal emitted by the tracker for the page-side controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    FirstInstall(DeploymentDescriptor),
    UpdateAvailable(DeploymentDescriptor),
    Activated(DeploymentDescriptor),
    Redundant(DeploymentDescriptor),
}

/// Whether `to` may follow `from` in a single worker's lifecycle.
///
/// States only move forward; `redundant` is reachable from anywhere.
/// Repeating the current state is accepted as a no-op.
pub fn is_valid_transition(from: WorkerLifecycleState, to: WorkerLifecycleState) -> bool {
    if from == to || to == WorkerLifecycleState::Redundant {
        return from != WorkerLifecycleState::Redundant || to == WorkerLifecycleState::Redundant;
    }
    if from.is_terminal() {
        return false;
    }
    to.rank() > from.rank()
}

/// Tracks the lifecycle of the worker currently being installed.
#[derive(Debug, Clone, Default)]
pub struct LifecycleTracker {
    worker: Option<(DeploymentDescriptor, WorkerLifecycleState)>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of the tracked worker, `None` when nothing is tracked.
    pub fn state(&self) -> WorkerLifecycleState {
        self.worker
            .as_ref()
            .map(|(_, s)| *s)
            .unwrap_or(WorkerLifecycleState::None)
    }

    pub fn tracked(&self) -> Option<&DeploymentDescriptor> {
        self.worker.as_ref().map(|(d, _)| d)
    }

    /// Feed one observed transition.
    ///
    /// A different deployment replaces the tracked worker (the platform
    /// discards an in-flight install when a newer artifact arrives).
    /// `has_controller` is sampled by the caller at the time of the event.
    pub fn observe(
        &mut self,
        descriptor: &DeploymentDescriptor,
        next: WorkerLifecycleState,
        has_controller: bool,
    ) -> Result<Option<LifecycleSignal>, LifecycleError> {
        let previous = match &self.worker {
            Some((tracked, state)) if tracked.is_same_deployment(descriptor) => *state,
            _ => WorkerLifecycleState::None,
        };

        if !is_valid_transition(previous, next) {
            return Err(LifecycleError::IllegalTransition {
                from: previous,
                to: next,
            });
        }
        self.worker = Some((descriptor.clone(), next));

        if previous == next {
            return Ok(None);
        }

        let signal = match next {
            WorkerLifecycleState::Installed => match classify_installed(has_controller) {
                InstallKind::FirstInstall => Some(LifecycleSignal::FirstInstall(descriptor.clone())),
                InstallKind::UpdateAvailable => {
                    Some(LifecycleSignal::UpdateAvailable(descriptor.clone()))
                }
            },
            WorkerLifecycleState::Activated => Some(LifecycleSignal::Activated(descriptor.clone())),
            WorkerLifecycleState::Redundant => Some(LifecycleSignal::Redundant(descriptor.clone())),
            _ => None,
        };
        Ok(signal)
    }
}

// ─── Tests ────────────────────────────────────────────────────────


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_state() -> impl Strategy<Value = WorkerLifecycleState> {
        proptest::sample::select(WorkerLifecycleState::ALL.to_vec())
    }

    proptest! {
        /// Rejected transitions leave the tracker untouched; accepted ones
        /// never move a worker backwards.
        #[test]
        fn tracker_only_moves_forward(
            steps in proptest::collection::vec((arb_state(), any::<bool>()), 1..20),
        ) {
            let d = DeploymentDescriptor::new("p", 1);
            let mut tracker = LifecycleTracker::new();
            for (next, has_controller) in steps {
                let before = tracker.state();
                match tracker.observe(&d, next, has_controller) {
                    Ok(signal) => {
                        prop_assert!(is_valid_transition(before, next));
                        prop_assert_eq!(tracker.state(), next);
                        if let Some(LifecycleSignal::UpdateAvailable(_)) = signal {
                            prop_assert!(has_controller);
                        }
                    }
                    Err(_) => prop_assert_eq!(tracker.state(), before),
                }
            }
        }
    }
}
