//! Online/offline reporting. Observes only; never retries or reconnects.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }

    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

/// Platform connectivity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    WentOnline,
    WentOffline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityTracker {
    current: Connectivity,
}

impl ConnectivityTracker {
    /// Seed from the platform's currently reported status.
    pub fn new(initial: Connectivity) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> Connectivity {
        self.current
    }

    /// Returns `true` when the value changed.
    pub fn apply(&mut self, signal: ConnectivitySignal) -> bool {
        let next = match signal {
            ConnectivitySignal::WentOnline => Connectivity::Online,
            ConnectivitySignal::WentOffline => Connectivity::Offline,
        };
        let changed = next != self.current;
        self.current = next;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_offline_is_reported_immediately() {
        let t = ConnectivityTracker::new(Connectivity::from_online(false));
        assert_eq!(t.current(), Connectivity::Offline);
    }

    #[test]
    fn transitions_and_duplicates() {
        let mut t = ConnectivityTracker::new(Connectivity::Online);
        assert!(!t.apply(ConnectivitySignal::WentOnline));
        assert!(t.apply(ConnectivitySignal::WentOffline));
        assert_eq!(t.current(), Connectivity::Offline);
        assert!(!t.apply(ConnectivitySignal::WentOffline));
        assert!(t.apply(ConnectivitySignal::WentOnline));
        assert!(t.current().is_online());
    }
}
