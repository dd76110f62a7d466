//! Explicit scheduler handle for scope and task creation.
//!
//! There is deliberately no process-wide default: callers construct a
//! `Scheduler` (from the current runtime or a dedicated one) and pass it by
//! reference to `Scope::new`. Child scopes inherit their parent's scheduler.

use std::future::Future;

use tokio::task::JoinHandle;

/// A handle to the carrier pool that executes task work.
///
/// Logical tasks are multiplexed over the runtime's worker threads and may
/// migrate between them across suspension points.
#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: tokio::runtime::Handle,
}

impl Scheduler {
    /// Create a scheduler backed by the runtime of the calling context.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime, mirroring
    /// `tokio::runtime::Handle::current`.
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    /// Create a scheduler backed by an explicit runtime handle.
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    pub(crate) fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }
}
