// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Latency-aware circuit breaker.
//!
//! Wraps async operations and counts consecutive unhealthy calls. A call is
//! unhealthy when it returns an error OR when it succeeds slower than the
//! configured latency threshold; both count the same. Once the count reaches
//! the limit the breaker "trips" and refuses calls (or routes them to a
//! fallback) until the cooldown has elapsed.
//!
//! States:
//! - Closed: Normal operation, requests pass through
//! - Open: Dependency unhealthy, requests fail fast or go to the fallback
//! - HalfOpen: Cooldown elapsed, exactly one probe call is let through
//!
//! The Open → HalfOpen check runs at the start of the next call. There is no
//! timer. Slow calls are never aborted, only penalized after the fact.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::SharedClock;

/// Circuit breaker state for metrics/monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Error type for circuit-protected operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit breaker rejected the call (circuit is open)
    #[error("circuit breaker open, request rejected")]
    Rejected,

    /// The underlying operation (or the fallback) failed
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

/// Operation classes with independently tuned breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Ordinary data reads
    FastPath,
    /// Payment submissions
    Payments,
    /// Telemetry writes
    Analytics,
}

impl OperationClass {
    pub const ALL: [OperationClass; 3] = [Self::FastPath, Self::Payments, Self::Analytics];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastPath => "fast_path",
            Self::Payments => "payments",
            Self::Analytics => "analytics",
        }
    }
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    /// Calls slower than this count as failures
    pub threshold_ms: u64,
    /// Consecutive failures that trip the circuit
    pub failure_count: u32,
    /// Cooldown before a probe call is allowed
    pub reset_time_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::fast_path()
    }
}

impl BreakerConfig {
    /// Ordinary reads: 1.5s threshold, trips after 5, 30s cooldown
    #[must_use]
    pub fn fast_path() -> Self {
        Self {
            threshold_ms: 1_500,
            failure_count: 5,
            reset_time_ms: 30_000,
        }
    }

    /// Payments trip faster and wait longer, failures there cost more
    #[must_use]
    pub fn payments() -> Self {
        Self {
            threshold_ms: 2_000,
            failure_count: 3,
            reset_time_ms: 60_000,
        }
    }

    /// Analytics are non-critical and tolerate more
    #[must_use]
    pub fn analytics() -> Self {
        Self {
            threshold_ms: 3_000,
            failure_count: 10,
            reset_time_ms: 45_000,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    #[must_use]
    pub fn reset_time(&self) -> Duration {
        Duration::from_millis(self.reset_time_ms)
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    last_latency: Option<Duration>,
    probe_in_flight: bool,
}

enum Admission {
    Pass { probe: bool },
    Refuse,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
}

/// A named circuit breaker with metrics tracking
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: SharedClock,
    inner: Mutex<BreakerState>,

    // Metrics
    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    slow_calls: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and config
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: SharedClock) -> Self {
        let name = name.into();
        crate::metrics::set_circuit_state(&name, CircuitState::Closed as u8);
        Self {
            name,
            config,
            clock,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                last_latency: None,
                probe_in_flight: false,
            }),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            slow_calls: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Stored state. An expired cooldown only becomes HalfOpen on the next call.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current consecutive failure count
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Latency of the most recently completed operation
    #[must_use]
    pub fn last_latency(&self) -> Option<Duration> {
        self.inner.lock().last_latency
    }

    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.consecutive_failures,
        }
    }

    /// Execute an async operation through the circuit breaker.
    ///
    /// Fails fast with [`CircuitError::Rejected`] while the circuit is open.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.admit() {
            Admission::Pass { probe } => self.run(operation, probe).await,
            Admission::Refuse => Err(CircuitError::Rejected),
        }
    }

    /// Execute through the breaker, calling `fallback` instead of rejecting
    /// while the circuit is open.
    ///
    /// The fallback is only used for refusals. An operation that is admitted
    /// and fails still returns [`CircuitError::Inner`].
    pub async fn call_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        match self.admit() {
            Admission::Pass { probe } => self.run(operation, probe).await,
            Admission::Refuse => {
                debug!(circuit = %self.name, "Circuit open, serving fallback");
                fallback().await.map_err(CircuitError::Inner)
            }
        }
    }

    /// Force the breaker back to Closed with a clean counter
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure_at = None;
        inner.probe_in_flight = false;
        crate::metrics::set_circuit_state(&self.name, CircuitState::Closed as u8);
        info!(circuit = %self.name, "Circuit manually reset");
    }

    fn admit(&self) -> Admission {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let admission = match inner.state {
            CircuitState::Closed => Admission::Pass { probe: false },
            CircuitState::Open => {
                let cooled = inner
                    .last_failure_at
                    .map_or(true, |at| now.saturating_duration_since(at) > self.config.reset_time());
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    crate::metrics::set_circuit_state(&self.name, CircuitState::HalfOpen as u8);
                    info!(circuit = %self.name, "Cooldown elapsed, letting one probe through");
                    Admission::Pass { probe: true }
                } else {
                    Admission::Refuse
                }
            }
            CircuitState::HalfOpen if inner.probe_in_flight => Admission::Refuse,
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Admission::Pass { probe: true }
            }
        };

        if matches!(admission, Admission::Refuse) {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_circuit_call(&self.name, "rejected");
        }
        admission
    }

    async fn run<F, Fut, T, E>(&self, operation: F, probe: bool) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut guard = ProbeGuard {
            inner: &self.inner,
            armed: probe,
        };

        let start = self.clock.now();
        let result = operation().await;
        let latency = self.clock.now().saturating_duration_since(start);
        crate::metrics::record_latency(&self.name, "call", latency);

        let slow = latency > self.config.threshold();
        let healthy = result.is_ok() && !slow;
        guard.armed = false;
        self.record(healthy, probe, latency);

        match result {
            Ok(value) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                if slow {
                    self.slow_calls.fetch_add(1, Ordering::Relaxed);
                    debug!(circuit = %self.name, latency_ms = latency.as_millis() as u64, "Slow success counted as failure");
                    crate::metrics::record_circuit_call(&self.name, "slow");
                } else {
                    crate::metrics::record_circuit_call(&self.name, "success");
                }
                Ok(value)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, "Circuit call failed");
                crate::metrics::record_circuit_call(&self.name, "failure");
                Err(CircuitError::Inner(e))
            }
        }
    }

    fn record(&self, healthy: bool, probe: bool, latency: Duration) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.last_latency = Some(latency);
        if probe {
            inner.probe_in_flight = false;
        }

        if healthy {
            if probe {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                crate::metrics::set_circuit_state(&self.name, CircuitState::Closed as u8);
                info!(circuit = %self.name, "Probe succeeded, circuit closed");
            } else if inner.state == CircuitState::Closed {
                inner.consecutive_failures = 0;
            }
            return;
        }

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let trip = if probe {
            true
        } else {
            inner.state == CircuitState::Closed
                && inner.consecutive_failures >= self.config.failure_count
        };
        if trip {
            inner.state = CircuitState::Open;
            inner.last_failure_at = Some(now);
            crate::metrics::set_circuit_state(&self.name, CircuitState::Open as u8);
            warn!(
                circuit = %self.name,
                failures = inner.consecutive_failures,
                reset_ms = self.config.reset_time_ms,
                "Circuit opened"
            );
        }
    }

    #[must_use]
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    /// Operations that returned a value (including slow ones)
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Operations that returned an error
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Successes that exceeded the latency threshold
    #[must_use]
    pub fn slow_calls(&self) -> u64 {
        self.slow_calls.load(Ordering::Relaxed)
    }

    /// Calls refused while open
    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Unhealthy (error or slow) share of admitted calls, 0.0 - 1.0
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let admitted = self.calls_total().saturating_sub(self.rejections());
        if admitted == 0 {
            return 0.0;
        }
        (self.failures() + self.slow_calls()) as f64 / admitted as f64
    }
}

/// Releases the half-open probe slot if the probe future is dropped mid-flight.
struct ProbeGuard<'a> {
    inner: &'a Mutex<BreakerState>,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().probe_in_flight = false;
        }
    }
}

/// One breaker per operation class
pub struct BreakerSet {
    pub fast_path: CircuitBreaker,
    pub payments: CircuitBreaker,
    pub analytics: CircuitBreaker,
}

impl BreakerSet {
    pub fn new(
        fast_path: BreakerConfig,
        payments: BreakerConfig,
        analytics: BreakerConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            fast_path: CircuitBreaker::new(OperationClass::FastPath.as_str(), fast_path, clock.clone()),
            payments: CircuitBreaker::new(OperationClass::Payments.as_str(), payments, clock.clone()),
            analytics: CircuitBreaker::new(OperationClass::Analytics.as_str(), analytics, clock),
        }
    }

    /// Reference tuning for all three classes
    pub fn with_defaults(clock: SharedClock) -> Self {
        Self::new(
            BreakerConfig::fast_path(),
            BreakerConfig::payments(),
            BreakerConfig::analytics(),
            clock,
        )
    }

    #[must_use]
    pub fn get(&self, class: OperationClass) -> &CircuitBreaker {
        match class {
            OperationClass::FastPath => &self.fast_path,
            OperationClass::Payments => &self.payments,
            OperationClass::Analytics => &self.analytics,
        }
    }

    /// `(name, snapshot)` for every breaker
    #[must_use]
    pub fn snapshots(&self) -> Vec<(&'static str, BreakerSnapshot)> {
        OperationClass::ALL
            .iter()
            .map(|class| (class.as_str(), self.get(*class).snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn scenario_config() -> BreakerConfig {
        BreakerConfig {
            threshold_ms: 100,
            failure_count: 2,
            reset_time_ms: 1_000,
        }
    }

    fn breaker(config: BreakerConfig) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::default();
        let cb = CircuitBreaker::new("test", config, Arc::new(clock.clone()));
        (cb, clock)
    }

    /// Succeeds after advancing the mock clock by `ms`.
    async fn timed_ok(clock: &MockClock, ms: u64) -> Result<i32, &'static str> {
        clock.advance(Duration::from_millis(ms));
        Ok(7)
    }

    #[tokio::test]
    async fn test_circuit_passes_successful_calls() {
        let (cb, _clock) = breaker(scenario_config());

        let result: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(cb.successes(), 1);
        assert_eq!(cb.failures(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_tracks_failures() {
        let (cb, _clock) = breaker(scenario_config());

        let result: Result<i32, CircuitError<&str>> = cb.call(|| async { Err("boom") }).await;

        assert!(matches!(result, Err(CircuitError::Inner("boom"))));
        assert_eq!(cb.failure_count(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_fast_success_resets_counter() {
        let (cb, _clock) = breaker(scenario_config());

        let _: Result<i32, _> = cb.call(|| async { Err::<i32, &str>("x") }).await;
        assert_eq!(cb.failure_count(), 1);

        let _: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(1) }).await;
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_then_recover_scenario() {
        let (cb, clock) = breaker(scenario_config());

        // Call 1: slow success
        let r = cb.call(|| timed_ok(&clock, 150)).await;
        assert_eq!(r.unwrap(), 7);
        assert_eq!(cb.failure_count(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);

        // Call 2: slow success trips the breaker
        let _ = cb.call(|| timed_ok(&clock, 150)).await;
        assert_eq!(cb.state(), CircuitState::Open);

        // Call 3: refused without running the operation
        let invoked = AtomicUsize::new(0);
        let r: Result<i32, CircuitError<&str>> = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await;
        assert_eq!(r, Err(CircuitError::Rejected));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        // Call 4 after the cooldown: probe goes through and closes the circuit
        clock.advance(Duration::from_millis(1_001));
        let r = cb.call(|| timed_ok(&clock, 50)).await;
        assert_eq!(r.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_cooldown_must_strictly_elapse() {
        let (cb, clock) = breaker(scenario_config());
        for _ in 0..2 {
            let _: Result<i32, _> = cb.call(|| async { Err::<i32, &str>("down") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_millis(1_000));
        let r: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(1) }).await;
        assert_eq!(r, Err(CircuitError::Rejected));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_failed_probe_reopens_and_restarts_cooldown() {
        let (cb, clock) = breaker(scenario_config());
        for _ in 0..2 {
            let _: Result<i32, _> = cb.call(|| async { Err::<i32, &str>("down") }).await;
        }

        clock.advance(Duration::from_millis(1_500));
        let r = cb.call(|| timed_ok(&clock, 300)).await;
        assert!(r.is_ok(), "slow probe still returns its value");
        assert_eq!(cb.state(), CircuitState::Open);

        // Cooldown restarted from the failed probe
        clock.advance(Duration::from_millis(500));
        let r: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(1) }).await;
        assert_eq!(r, Err(CircuitError::Rejected));

        clock.advance(Duration::from_millis(600));
        let r: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(1) }).await;
        assert_eq!(r, Ok(1));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_open_circuit_routes_to_fallback() {
        let (cb, _clock) = breaker(scenario_config());
        for _ in 0..2 {
            let _: Result<i32, _> = cb.call(|| async { Err::<i32, &str>("down") }).await;
        }

        let primary_calls = AtomicUsize::new(0);
        let r: Result<i32, CircuitError<&str>> = cb
            .call_with_fallback(
                || async {
                    primary_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                },
                || async { Ok(99) },
            )
            .await;

        assert_eq!(r, Ok(99));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.rejections(), 1);
    }

    #[tokio::test]
    async fn test_fallback_not_used_while_closed() {
        let (cb, _clock) = breaker(scenario_config());

        let r: Result<i32, CircuitError<&str>> = cb
            .call_with_fallback(|| async { Err("boom") }, || async { Ok(99) })
            .await;

        assert_eq!(r, Err(CircuitError::Inner("boom")));
    }

    #[tokio::test]
    async fn test_half_open_admits_single_probe() {
        let (cb, clock) = breaker(scenario_config());
        for _ in 0..2 {
            let _: Result<i32, _> = cb.call(|| async { Err::<i32, &str>("down") }).await;
        }
        clock.advance(Duration::from_millis(1_001));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let probe = cb.call(|| async move {
            let _ = rx.await;
            Ok::<i32, &str>(1)
        });
        let second = async {
            tokio::task::yield_now().await;
            let r: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(2) }).await;
            let _ = tx.send(());
            r
        };

        let (probe_result, second_result) = tokio::join!(probe, second);
        assert_eq!(probe_result, Ok(1));
        assert_eq!(second_result, Err(CircuitError::Rejected));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_probe_frees_slot() {
        let (cb, clock) = breaker(scenario_config());
        for _ in 0..2 {
            let _: Result<i32, _> = cb.call(|| async { Err::<i32, &str>("down") }).await;
        }
        clock.advance(Duration::from_millis(1_001));

        {
            let probe = cb.call(|| std::future::pending::<Result<i32, &str>>());
            let _ = tokio::time::timeout(Duration::from_millis(1), probe).await;
        }

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let r: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(3) }).await;
        assert_eq!(r, Ok(3));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let (cb, _clock) = breaker(scenario_config());
        for _ in 0..2 {
            let _: Result<i32, _> = cb.call(|| async { Err::<i32, &str>("down") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.snapshot(), BreakerSnapshot { state: CircuitState::Closed, failure_count: 0 });
    }

    #[tokio::test]
    async fn test_failure_rate_counts_slow_calls() {
        let config = BreakerConfig {
            threshold_ms: 100,
            failure_count: 100,
            reset_time_ms: 1_000,
        };
        let (cb, clock) = breaker(config);

        let _ = cb.call(|| timed_ok(&clock, 10)).await;
        let _ = cb.call(|| timed_ok(&clock, 500)).await;
        let _: Result<i32, _> = cb.call(|| async { Err::<i32, &str>("x") }).await;
        let _ = cb.call(|| timed_ok(&clock, 10)).await;

        assert_eq!(cb.slow_calls(), 1);
        assert_eq!(cb.last_latency(), Some(Duration::from_millis(10)));
        assert!((cb.failure_rate() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_breaker_presets() {
        let fast = BreakerConfig::fast_path();
        let payments = BreakerConfig::payments();
        let analytics = BreakerConfig::analytics();

        // Payments trip faster and wait longer
        assert!(payments.failure_count < fast.failure_count);
        assert!(payments.reset_time_ms > fast.reset_time_ms);
        // Analytics tolerate more
        assert!(analytics.failure_count > fast.failure_count);
        assert_eq!(analytics.threshold(), Duration::from_secs(3));
    }

    #[test]
    fn test_breaker_set_names() {
        let set = BreakerSet::with_defaults(crate::clock::system());

        assert_eq!(set.get(OperationClass::FastPath).name(), "fast_path");
        assert_eq!(set.get(OperationClass::Payments).config().failure_count, 3);
        let names: Vec<_> = set.snapshots().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["fast_path", "payments", "analytics"]);
    }
}
