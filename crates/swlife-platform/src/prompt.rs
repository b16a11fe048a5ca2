//! Deferred native install-prompt handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;

use swlife_core::PromptOutcome;

use crate::error::PlatformError;

/// The platform's "before install" event, retained after its default UI was
/// prevented. Consumed by a single call to [`prompt`](Self::prompt).
pub trait NativeInstallPrompt: Send + std::fmt::Debug {
    /// Show the native modal. The receiver resolves with the user's choice.
    fn prompt(self: Box<Self>) -> Result<oneshot::Receiver<PromptOutcome>, PlatformError>;
}

/// In-memory prompt whose answer is supplied by a [`PromptResponder`].
#[derive(Debug)]
pub struct SimulatedPrompt {
    choice: Option<oneshot::Receiver<PromptOutcome>>,
    shown: Arc<AtomicBool>,
}

/// Plays the user's side of a [`SimulatedPrompt`].
#[derive(Debug)]
pub struct PromptResponder {
    tx: oneshot::Sender<PromptOutcome>,
    shown: Arc<AtomicBool>,
}

impl SimulatedPrompt {
    pub fn new() -> (Self, PromptResponder) {
        let (tx, rx) = oneshot::channel();
        let shown = Arc::new(AtomicBool::new(false));
        (
            Self {
                choice: Some(rx),
                shown: Arc::clone(&shown),
            },
            PromptResponder { tx, shown },
        )
    }

    /// A prompt the user answers with `outcome` as soon as it is shown.
    pub fn answered(outcome: PromptOutcome) -> Self {
        let (prompt, responder) = Self::new();
        responder.respond(outcome);
        prompt
    }

    /// A handle the platform has already invalidated.
    pub fn expired() -> Self {
        Self {
            choice: None,
            shown: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl PromptResponder {
    pub fn was_shown(&self) -> bool {
        self.shown.load(Ordering::SeqCst)
    }

    pub fn respond(self, outcome: PromptOutcome) {
        // The prompt side may already be gone; nothing to deliver then.
        let _ = self.tx.send(outcome);
    }
}

impl NativeInstallPrompt for SimulatedPrompt {
    fn prompt(mut self: Box<Self>) -> Result<oneshot::Receiver<PromptOutcome>, PlatformError> {
        let rx = self
            .choice
            .take()
            .ok_or_else(|| PlatformError::PromptUnavailable("handle expired".to_string()))?;
        self.shown.store(true, Ordering::SeqCst);
        Ok(rx)
    }
}
