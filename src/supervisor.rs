// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Supervised fire-and-forget tasks.
//!
//! Background work (stale revalidation, queue workers, batch flushes) runs
//! detached from the request that started it. Every such task goes through
//! [`TaskSupervisor::spawn`], which tracks it for shutdown and catches a
//! panic at the join point so it is logged rather than propagated.
//!
//! Must be used from inside a Tokio runtime.

use std::future::Future;
use tokio::task::AbortHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

#[derive(Clone, Default)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background under supervision.
    ///
    /// The returned handle can cancel the task; cancellation is not logged as a failure.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let abort = handle.abort_handle();
        self.tracker.spawn(async move {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    error!(task = name, "Background task panicked");
                    crate::metrics::record_background_panic(name);
                }
                Err(_) => debug!(task = name, "Background task cancelled"),
            }
        });
        abort
    }

    /// Live supervised tasks
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Wait for every task spawned so far, without closing.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Close the tracker and wait for all in-flight tasks.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
