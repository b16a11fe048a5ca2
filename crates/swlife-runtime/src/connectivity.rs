//! Online/offline observer. Reports only; never retries or reconnects.

use std::sync::Mutex;

use tokio::sync::watch;

use swlife_core::{Connectivity, ConnectivitySignal, ConnectivityTracker};

pub struct ConnectivityObserver {
    tracker: Mutex<ConnectivityTracker>,
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityObserver {
    /// Seeded from the platform's current status, so subscribers never see
    /// a transient `Online` on an offline start.
    pub fn new(online: bool) -> Self {
        let initial = Connectivity::from_online(online);
        let (tx, _) = watch::channel(initial);
        Self {
            tracker: Mutex::new(ConnectivityTracker::new(initial)),
            tx,
        }
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }

    /// Apply a platform signal. Returns whether the state changed; repeated
    /// signals leave subscribers untouched.
    pub fn apply(&self, signal: ConnectivitySignal) -> bool {
        let mut tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
        if !tracker.apply(signal) {
            return false;
        }
        let now = tracker.current();
        self.tx.send_replace(now);
        tracing::info!(connectivity = ?now, "connectivity changed");
        true
    }
}
