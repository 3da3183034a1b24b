//! Request-scoped cancellation flag.
//!
//! One compile request owns one [`CancelHandle`]. Setting it is idempotent
//! and one-shot: the flag never resets. The progress adapter polls it to
//! answer the engine's cooperative-abort question, and the orchestrator
//! awaits it to run the cancel routine while the engine is busy.

use std::sync::Arc;

use tokio::sync::watch;

/// A one-shot cancellation flag shared across a compile request.
///
/// Cloning the handle shares the same underlying flag.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelHandle {
    /// Creates a fresh, unset flag.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Sets the flag.
    ///
    /// Returns `true` on the first call and `false` on every later call;
    /// setting an already-set flag has no effect.
    pub fn cancel(&self) -> bool {
        self.sender.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Returns `true` if the flag has been set.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Waits until the flag is set.
    ///
    /// Completes immediately when the flag is already set. Usable in
    /// `tokio::select!` alongside the engine join handle.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender cannot drop while this handle holds an Arc to it, so
        // wait_for only fails after every handle is gone.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
