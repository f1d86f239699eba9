//! Cooperative cancellation shared by the appender and its worker.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use thiserror::Error;

/// Returned by blocking operations interrupted by a stop request.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Cloneable stop signal.
///
/// Sleeps wait on a channel whose sender is dropped on cancellation, so a
/// sleeping worker wakes immediately instead of at the end of its delay.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    wake_tx: Arc<Mutex<Option<Sender<()>>>>,
    wake_rx: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            wake_tx: Arc::new(Mutex::new(Some(tx))),
            wake_rx: rx,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.wake_tx.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail fast when cancellation has been requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `delay` unless cancelled first.
    pub fn sleep(&self, delay: Duration) -> Result<(), Cancelled> {
        self.check()?;
        match self.wake_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Err(Cancelled),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
