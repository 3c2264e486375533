// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Failure containment: latency-aware circuit breakers and retry policy.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    BreakerConfig, BreakerSet, BreakerSnapshot, CircuitBreaker, CircuitError, CircuitState, OperationClass,
};
pub use retry::{BackoffConfig, RetryDecision, RetryPolicy};
