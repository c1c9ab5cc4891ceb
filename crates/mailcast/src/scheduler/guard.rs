//! Non-blocking single-flight guard for scheduler ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// At most one [`TickPermit`] exists at a time. A tick that cannot get one
/// is skipped, never queued.
#[derive(Debug, Clone, Default)]
pub struct TickGuard {
    running: Arc<AtomicBool>,
}

impl TickGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_enter(&self) -> Option<TickPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickPermit {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of a tick. Dropping it frees the guard.
#[derive(Debug)]
pub struct TickPermit {
    running: Arc<AtomicBool>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
