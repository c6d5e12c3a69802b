use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{AutosubError, Result};

/// Cooperative cancellation token shared by every stage of a single run.
///
/// Cloning is cheap (it's a handle to shared state); every component that
/// accepts a `CancelToken` must check it at least once per inner-loop
/// iteration and at every suspension point (process spawn, HTTP call,
/// filesystem I/O, backoff sleep).
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns `Err(Cancelled)` if the token has been tripped, otherwise `Ok(())`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AutosubError::Cancelled)
        } else {
            Ok(())
        }
    }
}
