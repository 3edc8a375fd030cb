//! Single-flight guard for poll loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// At most one poll loop per displayed result.
///
/// Cloning shares the slot. The slot frees itself when the [`PollGuard`] drops.
#[derive(Debug, Clone, Default)]
pub struct PollSlot {
    busy: Arc<AtomicBool>,
}

impl PollSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or `None` while another loop holds it.
    pub fn try_acquire(&self) -> Option<PollGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PollGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct PollGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
