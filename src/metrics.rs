// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for load-control.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding service is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `load_control_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `circuit`: fast_path, payments, analytics
//! - `region`: cache region name
//! - `outcome` / `status`: what happened

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record circuit breaker state change (0 = Closed, 1 = HalfOpen, 2 = Open)
pub fn set_circuit_state(circuit: &str, state: u8) {
    gauge!(
        "load_control_circuit_breaker_state",
        "circuit" => circuit.to_string()
    )
    .set(state as f64);
}

/// Record circuit breaker call (success, slow, failure, rejected)
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "load_control_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(scope: &str, operation: &str, duration: Duration) {
    histogram!(
        "load_control_operation_seconds",
        "scope" => scope.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set current entry count of a cache region
pub fn set_cache_entries(region: &str, count: usize) {
    gauge!(
        "load_control_cache_entries",
        "region" => region.to_string()
    )
    .set(count as f64);
}

/// Record a cache lookup (fresh, stale, expired, miss)
pub fn record_cache_lookup(region: &str, outcome: &str) {
    counter!(
        "load_control_cache_lookups_total",
        "region" => region.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a deduplicated call (executed or coalesced)
pub fn record_dedup(name: &str, outcome: &str) {
    counter!(
        "load_control_dedup_calls_total",
        "dedup" => name.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_queue_enqueue(queue: &str) {
    counter!(
        "load_control_queue_enqueued_total",
        "queue" => queue.to_string()
    )
    .increment(1);
}

/// Set queue occupancy gauges
pub fn set_queue_depth(queue: &str, pending: usize, processing: usize) {
    gauge!(
        "load_control_queue_pending",
        "queue" => queue.to_string()
    )
    .set(pending as f64);
    gauge!(
        "load_control_queue_processing",
        "queue" => queue.to_string()
    )
    .set(processing as f64);
}

pub fn record_queue_retry(queue: &str) {
    counter!(
        "load_control_queue_retries_total",
        "queue" => queue.to_string()
    )
    .increment(1);
}

/// Record a terminal task status (completed, failed)
pub fn record_queue_outcome(queue: &str, status: &str) {
    counter!(
        "load_control_queue_outcomes_total",
        "queue" => queue.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a batch submission and its size
pub fn record_batch_flush(collector: &str, reason: &str, status: &str, count: usize) {
    counter!(
        "load_control_batch_flushes_total",
        "collector" => collector.to_string(),
        "reason" => reason.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "load_control_batch_size",
        "collector" => collector.to_string()
    )
    .record(count as f64);
}

/// Record a route response by HTTP status and cache outcome
pub fn record_route_response(route: &str, status: u16, cache: &str) {
    counter!(
        "load_control_route_responses_total",
        "route" => route.to_string(),
        "status" => status.to_string(),
        "cache" => cache.to_string()
    )
    .increment(1);
}

/// Record a panic caught in a supervised background task
pub fn record_background_panic(task: &str) {
    counter!(
        "load_control_background_panics_total",
        "task" => task.to_string()
    )
    .increment(1);
}

/// Set resident memory of the process in bytes
pub fn set_resident_memory(bytes: u64) {
    gauge!("load_control_resident_memory_bytes").set(bytes as f64);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    scope: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(scope: &'static str, operation: &'static str) -> Self {
        Self {
            scope,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.scope, self.operation, self.start.elapsed());
    }
}
