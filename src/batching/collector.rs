// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fire-and-forget batch collector for telemetry.
//!
//! [`BatchCollector::track`] appends to an in-memory buffer and returns. It
//! never waits and never fails. The first event after a flush arms a timer;
//! reaching `max_batch_size` flushes at once and disarms it. A flush swaps the
//! buffer out and submits it as one call. If the submission fails the batch
//! is logged and dropped.
//!
//! `track` spawns background work, so it must be called inside a Tokio runtime.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::event_buffer::{EventBuffer, FlushBatch, FlushReason};
use crate::supervisor::TaskSupervisor;

/// Outbound bulk submission failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("batch submission failed: {0}")]
pub struct SinkError(pub String);

/// Receives whole batches, e.g. an analytics ingestion endpoint.
#[async_trait]
pub trait BatchSink<E>: Send + Sync {
    async fn submit(&self, batch: Vec<E>) -> Result<(), SinkError>;
}

/// Configuration for batch collection
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Flush as soon as this many events are buffered
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Flush this long after the first buffered event
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_max_batch_size() -> usize { 100 }
fn default_flush_interval_ms() -> u64 { 5_000 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Collector counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub buffered: usize,
    pub flushes: u64,
    pub delivered_events: u64,
    pub dropped_events: u64,
}

struct CollectorState<E> {
    buffer: EventBuffer<E>,
    timer: Option<AbortHandle>,
    /// Bumped on every flush so a late timer cannot flush a newer buffer
    generation: u64,
}

struct CollectorInner<E> {
    name: String,
    config: BatchConfig,
    sink: Arc<dyn BatchSink<E>>,
    state: Mutex<CollectorState<E>>,
    supervisor: TaskSupervisor,
    flushes: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

pub struct BatchCollector<E> {
    inner: Arc<CollectorInner<E>>,
}

impl<E> Clone for BatchCollector<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Send + 'static> BatchCollector<E> {
    pub fn new(
        name: impl Into<String>,
        config: BatchConfig,
        sink: Arc<dyn BatchSink<E>>,
        supervisor: TaskSupervisor,
    ) -> Self {
        let buffer = EventBuffer::new(config.max_batch_size);
        Self {
            inner: Arc::new(CollectorInner {
                name: name.into(),
                config,
                sink,
                state: Mutex::new(CollectorState {
                    buffer,
                    timer: None,
                    generation: 0,
                }),
                supervisor,
                flushes: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Buffer an event. Never blocks, never fails.
    pub fn track(&self, event: E) {
        let now = tokio::time::Instant::now().into_std();
        let ready = {
            let mut state = self.inner.state.lock();
            match state.buffer.push(event, now) {
                Some(reason) => Self::take_locked(&mut state, reason),
                None => {
                    if state.buffer.len() == 1 {
                        self.arm_timer(&mut state);
                    }
                    None
                }
            }
        };

        if let Some(batch) = ready {
            let inner = self.inner.clone();
            self.inner.supervisor.spawn("batch_flush", async move {
                inner.submit(batch).await;
            });
        }
    }

    /// Flush whatever is buffered now and wait for the submission.
    pub async fn flush(&self) {
        self.flush_with_reason(FlushReason::Manual).await;
    }

    /// Final flush on the way down.
    pub async fn shutdown(&self) {
        self.flush_with_reason(FlushReason::Shutdown).await;
    }

    async fn flush_with_reason(&self, reason: FlushReason) {
        let batch = {
            let mut state = self.inner.state.lock();
            Self::take_locked(&mut state, reason)
        };
        if let Some(batch) = batch {
            self.inner.submit(batch).await;
        }
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    #[must_use]
    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            buffered: self.buffered(),
            flushes: self.inner.flushes.load(Ordering::Relaxed),
            delivered_events: self.inner.delivered.load(Ordering::Relaxed),
            dropped_events: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    fn arm_timer(&self, state: &mut CollectorState<E>) {
        let generation = state.generation;
        let interval = self.inner.config.flush_interval();
        let inner = self.inner.clone();
        let handle = self.inner.supervisor.spawn("batch_timer", async move {
            tokio::time::sleep(interval).await;
            let batch = {
                let mut state = inner.state.lock();
                if state.generation != generation {
                    return;
                }
                state.timer = None;
                Self::take_locked(&mut state, FlushReason::Time)
            };
            if let Some(batch) = batch {
                inner.submit(batch).await;
            }
        });
        state.timer = Some(handle);
    }

    fn take_locked(state: &mut CollectorState<E>, reason: FlushReason) -> Option<FlushBatch<E>> {
        let batch = state.buffer.take(reason)?;
        state.generation = state.generation.wrapping_add(1);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        Some(batch)
    }
}

impl<E: Send + 'static> CollectorInner<E> {
    async fn submit(&self, batch: FlushBatch<E>) {
        let count = batch.items.len();
        self.flushes.fetch_add(1, Ordering::Relaxed);
        match self.sink.submit(batch.items).await {
            Ok(()) => {
                self.delivered.fetch_add(count as u64, Ordering::Relaxed);
                crate::metrics::record_batch_flush(&self.name, batch.reason.as_str(), "success", count);
                debug!(collector = %self.name, count, reason = batch.reason.as_str(), "Batch delivered");
            }
            Err(e) => {
                self.dropped.fetch_add(count as u64, Ordering::Relaxed);
                crate::metrics::record_batch_flush(&self.name, batch.reason.as_str(), "dropped", count);
                warn!(collector = %self.name, count, error = %e, "Batch submission failed, events dropped");
            }
        }
    }
}
