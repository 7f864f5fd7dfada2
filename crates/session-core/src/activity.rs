use std::{
    sync::{
        Arc, atomic::{AtomicU64, Ordering}
    },
    time::Duration,
};

use tokio::time::Instant;
use tracing::trace;

/// User interactions that count as activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

/// Source of the "last activity" instant the session clock measures idleness from.
///
/// Hosts report interactions through [`record`](Self::record); nothing polls.
pub trait ActivityTracker: Send + Sync {
    fn record_activity(&self);

    fn last_activity(&self) -> Instant;

    fn record(&self, kind: ActivityKind) {
        trace!(?kind, "user activity");
        self.record_activity();
    }
}

/// Lock-free tracker that can be cloned into input threads and the session task.
#[derive(Clone, Debug)]
pub struct SharedActivity {
    origin: Instant,
    since_origin_ms: Arc<AtomicU64>,
}

impl SharedActivity {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            since_origin_ms: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for SharedActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker for SharedActivity {
    fn record_activity(&self) {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        self.since_origin_ms.store(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    fn last_activity(&self) -> Instant {
        self.origin + Duration::from_millis(self.since_origin_ms.load(Ordering::Relaxed))
    }
}
