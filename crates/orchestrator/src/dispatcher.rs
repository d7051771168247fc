//! Single-consumer message queue for the cooperative sequencer.
//!
//! Producers (driver status callbacks, socket readiness callbacks, the
//! sequencer's own phase handlers) hold a cloneable [`DispatchHandle`] and
//! can only enqueue. The owner of the [`Dispatcher`] takes messages one at
//! a time, in the order they were enqueued, and runs each handler to
//! completion before taking the next. Handlers enqueue follow-up work and
//! return; they never call back into the queue's consumer.

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{OrchestratorError, Result};

/// Enqueue-only side of a [`Dispatcher`].
pub struct DispatchHandle<M> {
    tx: mpsc::UnboundedSender<M>,
}

impl<M> Clone for DispatchHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> DispatchHandle<M> {
    pub fn enqueue(&self, message: M) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| OrchestratorError::DispatcherClosed)
    }
}

/// FIFO queue drained by a single consumer.
pub struct Dispatcher<M> {
    tx: mpsc::UnboundedSender<M>,
    rx: mpsc::UnboundedReceiver<M>,
    dispatched: u64,
}

impl<M> Dispatcher<M> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx,
            dispatched: 0,
        }
    }

    pub fn handle(&self) -> DispatchHandle<M> {
        DispatchHandle {
            tx: self.tx.clone(),
        }
    }

    /// Enqueue from the consumer side. Cannot fail: the dispatcher owns a receiver.
    pub fn enqueue(&self, message: M) {
        // The receiver lives in `self`, so the channel is open.
        let _ = self.tx.send(message);
    }

    /// Take the next message if one is queued.
    pub fn try_next(&mut self) -> Option<M> {
        let message = self.rx.try_recv().ok()?;
        self.dispatched += 1;
        trace!(dispatched = self.dispatched, "Dispatching queued message");
        Some(message)
    }

    /// Wait for the next message.
    ///
    /// The dispatcher keeps a sender of its own, so this waits indefinitely
    /// on an empty queue rather than reporting closure.
    pub async fn next(&mut self) -> M {
        match self.rx.recv().await {
            Some(message) => {
                self.dispatched += 1;
                trace!(dispatched = self.dispatched, "Dispatching message");
                message
            }
            None => std::future::pending().await,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Messages handed out so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

impl<M> Default for Dispatcher<M> {
    fn default() -> Self {
        Self::new()
    }
}
