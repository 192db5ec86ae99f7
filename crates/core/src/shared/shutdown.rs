//! Process-wide cancellation shared by the long-running loops.
//!
//! The trigger owns the only sender of a never-used channel; dropping it
//! disconnects every token's receiver, which wakes any thread parked in
//! [`ShutdownToken::sleep`] immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// Creates a connected trigger/token pair.
pub fn channel() -> (ShutdownTrigger, ShutdownToken) {
    let cancelled = Arc::new(AtomicBool::new(false));
    let (tx, rx) = crossbeam_channel::bounded::<()>(0);
    (
        ShutdownTrigger {
            cancelled: cancelled.clone(),
            wake: Some(tx),
        },
        ShutdownToken {
            cancelled,
            wake: rx,
        },
    )
}

/// Requests shutdown. Dropping the trigger also requests shutdown.
pub struct ShutdownTrigger {
    cancelled: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
}

impl ShutdownTrigger {
    pub fn trigger(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.take();
    }

    pub fn is_triggered(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for ShutdownTrigger {
    fn drop(&mut self) {
        self.trigger();
    }
}

/// Cheap, cloneable view of the shutdown state handed to each loop.
#[derive(Clone)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
    wake: Receiver<()>,
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless shutdown arrives first.
    ///
    /// Returns `true` if the full duration elapsed and the caller should keep going.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.wake.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}
