use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-session flag that keeps a second submission out while one is in flight.
#[derive(Debug, Default)]
pub struct SubmissionGuard {
    held: AtomicBool,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the caller now holds the guard.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Acquires the guard and hands back a permit that releases it on drop,
    /// so every exit path (errors and panics included) frees the session.
    pub fn try_permit(self: &Arc<Self>) -> Option<SubmissionPermit> {
        if self.try_acquire() {
            Some(SubmissionPermit {
                guard: Arc::clone(self),
            })
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct SubmissionPermit {
    guard: Arc<SubmissionGuard>,
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.guard.release();
    }
}
