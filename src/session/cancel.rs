//! Cooperative cancellation shared between the signal handler and the session loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set once; observed by the session only between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
