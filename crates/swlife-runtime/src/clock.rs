//! Time sources.
//!
//! Wall-clock milliseconds are used for persisted values (dismissal record,
//! build timestamp). Controller deadlines use tokio's monotonic clock so they
//! follow a paused clock in tests.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;

/// Wall-clock epoch milliseconds, injectable for tests.
pub type WallClock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> WallClock {
    Arc::new(|| Utc::now().timestamp_millis())
}

pub fn fixed_clock(now_ms: i64) -> WallClock {
    Arc::new(move || now_ms)
}

/// Milliseconds elapsed since a fixed origin on the tokio clock.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicMs {
    origin: Instant,
}

impl MonotonicMs {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    /// Instant corresponding to `ms` after the origin.
    pub fn instant_at(&self, ms: i64) -> Instant {
        self.origin + std::time::Duration::from_millis(u64::try_from(ms).unwrap_or(0))
    }
}
