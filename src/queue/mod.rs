// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Soft admission control for write-heavy operations.
//!
//! See [`SoftQueue`] for the algorithm.

pub mod soft_queue;

pub use soft_queue::{QueueConfig, SoftQueue, TaskProcessor};

use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task held by the queue. The payload is opaque to the queue.
#[derive(Debug, Clone)]
pub struct QueuedTask<P> {
    /// Caller-supplied correlation id
    pub id: String,
    pub payload: P,
    pub enqueued_at: Instant,
    pub status: TaskStatus,
    /// Re-admissions after failure so far
    pub retries: u32,
}

/// Immediate acknowledgment returned by `enqueue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueAck {
    pub task_id: String,
    pub status: &'static str,
}

impl EnqueueAck {
    pub(crate) fn queued(task_id: String) -> Self {
        Self {
            task_id,
            status: "queued",
        }
    }
}

/// Terminal result of a task, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    /// Total attempts made, including the first
    pub attempts: u32,
    pub error: Option<String>,
}

/// Snapshot of queue occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// All tasks held, pending or processing
    pub queue_length: usize,
    /// Occupied worker slots
    pub active_count: usize,
    pub pending: usize,
    pub processing: usize,
}

/// A single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TaskError(pub String);

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is closed to new tasks")]
    Closed,
    #[error("task '{0}' is already queued")]
    DuplicateTask(String),
}
