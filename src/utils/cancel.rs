//! Process-wide cancellation signal shared by the puller, workers and blocked waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable cancel flag. Cancelling is one-way; every clone observes it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Install a Ctrl+C handler that cancels this token. Only one handler per process.
    pub fn cancel_on_ctrlc(&self) -> anyhow::Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            log::warn!("Interrupt received, cancelling...");
            token.cancel();
        })?;
        Ok(())
    }
}
