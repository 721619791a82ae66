use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stop request shared between the signal thread and the session.
///
/// Clones observe the same flag. Nothing is interrupted: the session loop
/// checks it before each period, so an attempt in flight always completes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Raise the flag. Returns `true` only for the call that raised it.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }
}
