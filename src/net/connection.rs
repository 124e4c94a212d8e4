//! In-flight request tracking with a hard ceiling.
//!
//! The edge counts requests currently being forwarded. Once the ceiling is
//! reached new requests are shed with 503 instead of queueing behind a slow
//! upstream. Slots are released by a guard, so a panicking handler still
//! gives its slot back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared counter of in-flight requests.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    active: Arc<AtomicUsize>,
    limit: usize,
}

impl InFlightTracker {
    /// Create a tracker admitting at most `limit` concurrent requests.
    pub fn new(limit: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Claim a slot, or `None` when the ceiling has been reached.
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.limit).then_some(current + 1)
            })
            .ok()
            .map(|_| InFlightGuard {
                active: Arc::clone(&self.active),
            })
    }

    /// Current number of in-flight requests.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Configured ceiling.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Holds one in-flight slot; released on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
