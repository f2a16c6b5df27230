use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-way cancellation signal shared by every step of a workflow run.
///
/// Cancellation is cooperative: steps poll the flag at entry and at loop
/// checkpoints. In-flight remote calls are never interrupted, so a step
/// already past its last checkpoint may still complete and report success.
/// Once set, the flag never resets for that run.
#[derive(Clone, Debug, Default)]
pub struct CancelScope {
    flag: Arc<AtomicBool>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Idempotent; safe to call from any number of steps
    /// concurrently.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
