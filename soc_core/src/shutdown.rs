//! Cooperative stop signal shared between the estimator loop, the end-of-test
//! listener and the ctrl-c handler.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Raised once, never lowered. Writers publish with `Release`, the loop reads
/// with `Acquire` at the top of every period.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
