// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Best-effort telemetry batching.
//!
//! Events are buffered by [`BatchCollector::track`] and submitted in bulk by a
//! size or time trigger. Delivery is lossy: a failed submission is dropped.

pub mod collector;
pub mod event_buffer;

pub use collector::{BatchCollector, BatchConfig, BatchSink, CollectorStats, SinkError};
pub use event_buffer::{EventBuffer, FlushBatch, FlushReason};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single telemetry record as submitted to the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub name: String,
    #[serde(default)]
    pub properties: Value,
    /// Unix epoch millis at the time of `track`
    pub recorded_at_ms: u64,
}

impl AnalyticsEvent {
    pub fn new(name: impl Into<String>, properties: Value) -> Self {
        let recorded_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            name: name.into(),
            properties,
            recorded_at_ms,
        }
    }
}
