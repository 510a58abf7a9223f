//! Cooperative cancellation.
//!
//! A context handle threaded through every top-level operation. Phases
//! check it between named units of work (per-instance validation,
//! per-import resolution, per-type merge, per-add graph operation) and
//! return early with a cancellation diagnostic rather than being preempted
//! mid-expression.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cheap-to-clone cancellation handle, optionally carrying a deadline.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// A token that is never cancelled and carries no deadline, for callers
    /// that don't care about cooperative cancellation.
    pub fn never() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Creates a fresh, linked cancellation handle: cloning it and calling
    /// `cancel()` on any clone cancels all of them.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Creates a token that becomes cancelled once `timeout` elapses from
    /// now, in addition to manual cancellation.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Marks this token (and every clone of it) as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True if cancelled manually or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_is_never_cancelled() {
        let t = CancellationToken::never();
        assert!(!t.is_cancelled());
    }

    #[test]
    fn cancel_propagates_to_clones() {
        let t = CancellationToken::new();
        let clone = t.clone();
        assert!(!clone.is_cancelled());
        t.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn timeout_expires() {
        let t = CancellationToken::with_timeout(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(t.is_cancelled());
    }
}
