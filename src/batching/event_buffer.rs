// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ordered buffer of pending events.
//!
//! The [`EventBuffer`] collects items and reports when they should be flushed:
//! on reaching the size threshold, or once the oldest buffered item has waited
//! the flush interval. Whichever comes first wins.
//!
//! # Example
//!
//! ```
//! use load_control::batching::{EventBuffer, FlushReason};
//! use std::time::Instant;
//!
//! let mut buffer = EventBuffer::new(2);
//! let now = Instant::now();
//! assert!(buffer.push("page_view", now).is_none());
//! assert_eq!(buffer.push("click", now), Some(FlushReason::Count));
//!
//! let batch = buffer.take(FlushReason::Count).unwrap();
//! assert_eq!(batch.items, vec!["page_view", "click"]);
//! assert!(buffer.is_empty());
//! ```

use std::time::{Duration, Instant};
use tracing::debug;

/// Batch flush trigger reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Flush interval elapsed since the first buffered event
    Time,
    /// Size threshold reached
    Count,
    /// Manual flush requested
    Manual,
    /// Shutdown flush
    Shutdown,
}

impl FlushReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Count => "count",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        }
    }
}

/// A batch of items ready for submission
#[derive(Debug)]
pub struct FlushBatch<T> {
    pub items: Vec<T>,
    pub reason: FlushReason,
}

/// Unbounded-until-flush buffer with a size trigger.
#[derive(Debug)]
pub struct EventBuffer<T> {
    items: Vec<T>,
    first_at: Option<Instant>,
    max_batch_size: usize,
}

impl<T> EventBuffer<T> {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            items: Vec::new(),
            first_at: None,
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Append an item, returns flush reason if the size threshold is hit
    pub fn push(&mut self, item: T, now: Instant) -> Option<FlushReason> {
        if self.items.is_empty() {
            self.first_at = Some(now);
        }
        self.items.push(item);

        (self.items.len() >= self.max_batch_size).then_some(FlushReason::Count)
    }

    /// Whether the oldest buffered item has waited at least `interval`
    #[must_use]
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        self.first_at
            .is_some_and(|first| now.saturating_duration_since(first) >= interval)
    }

    /// Swap out everything buffered. `None` when empty.
    pub fn take(&mut self, reason: FlushReason) -> Option<FlushBatch<T>> {
        if self.items.is_empty() {
            return None;
        }
        self.first_at = None;
        let items = std::mem::take(&mut self.items);
        debug!(count = items.len(), reason = reason.as_str(), "Batch taken for flush");
        Some(FlushBatch { items, reason })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Age of the oldest buffered item
    #[must_use]
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.first_at.map(|first| now.saturating_duration_since(first))
    }
}
