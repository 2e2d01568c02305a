//! Serialized access to the shared module slot.
//!
//! The VM module is not reentrant, so every operation that touches it, be it
//! an execution or a reload, goes through one FIFO-fair async mutex. The
//! operation itself runs on the blocking pool with the guard moved into it:
//! the orchestrating thread stays free while the gate is held, and the gate
//! is only released once the native work has actually finished, even if the
//! caller stopped waiting for it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// Mutual exclusion over a single shared slot.
pub struct ExecutionGate<S> {
    slot: Arc<Mutex<S>>,
}

impl<S> Clone for ExecutionGate<S> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<S: Send + 'static> ExecutionGate<S> {
    pub fn new(slot: S) -> Self {
        Self {
            slot: Arc::new(Mutex::new(slot)),
        }
    }

    /// Run `operation` with exclusive access to the slot.
    ///
    /// Waits for admission in FIFO order, runs the operation on the blocking
    /// pool and returns its result unchanged. A panicking operation releases
    /// the gate and is reported as `Error::WorkerPanicked`.
    pub async fn with_gate<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = Arc::clone(&self.slot).lock_owned().await;

        tokio::task::spawn_blocking(move || operation(&mut guard))
            .await
            .map_err(|e| {
                tracing::error!("Gated operation did not complete: {}", e);
                Error::WorkerPanicked(e.to_string())
            })?
    }

    /// Run a short, non-blocking inspection of the slot.
    ///
    /// Still queues behind in-flight operations.
    pub async fn inspect<F, T>(&self, inspect: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let guard = self.slot.lock().await;
        inspect(&guard)
    }
}

impl<S> fmt::Debug for ExecutionGate<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGate")
            .field("held", &self.slot.try_lock().is_err())
            .finish()
    }
}
