// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-flight request coalescing.
//!
//! Concurrent callers asking for the same key share one execution of the
//! underlying operation and all observe its outcome, value or error. The key
//! is unregistered as soon as the operation finishes, before anyone is
//! resolved, so the next call after completion runs the operation again.
//!
//! Nothing is cached across calls here. Temporal reuse belongs to the
//! [`SmartCache`](crate::cache::SmartCache); this only merges calls that
//! overlap in time.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

type Slot<T, E> = Arc<OnceCell<Result<T, E>>>;

pub struct RequestDeduplicator<T, E> {
    name: String,
    in_flight: DashMap<String, Slot<T, E>>,
    executions: AtomicU64,
    coalesced: AtomicU64,
}

impl<T, E> RequestDeduplicator<T, E>
where
    T: Clone,
    E: Clone,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_flight: DashMap::new(),
            executions: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Run `operation` for `key`, or join the execution already running for it.
    ///
    /// If the caller driving the shared execution is dropped, a waiting caller
    /// takes over with its own `operation`. With no one waiting, the key is
    /// unregistered.
    pub async fn execute<F, Fut>(&self, key: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(vacant) => {
                let slot: Slot<T, E> = Arc::new(OnceCell::new());
                vacant.insert(slot.clone());
                slot
            }
        };
        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            key,
            slot,
        };

        let ran = AtomicBool::new(false);
        let result = guard
            .slot
            .get_or_init(|| async {
                ran.store(true, Ordering::Relaxed);
                let result = operation().await;
                self.in_flight.remove_if(key, |_, current| Arc::ptr_eq(current, &guard.slot));
                result
            })
            .await;

        if ran.load(Ordering::Relaxed) {
            self.executions.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_dedup(&self.name, "executed");
        } else {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_dedup(&self.name, "coalesced");
            debug!(dedup = %self.name, key = %key, "Joined in-flight request");
        }
        result.clone()
    }
}

/// Unregisters an abandoned slot when its last caller is dropped mid-flight.
struct InFlightGuard<'a, T, E> {
    in_flight: &'a DashMap<String, Slot<T, E>>,
    key: &'a str,
    slot: Slot<T, E>,
}

impl<T, E> Drop for InFlightGuard<'_, T, E> {
    fn drop(&mut self) {
        // Held by the map and this guard only: nobody is left to take over.
        // Runs under the shard lock, so a caller cannot join concurrently.
        self.in_flight.remove_if(self.key, |_, current| {
            Arc::ptr_eq(current, &self.slot) && !current.initialized() && Arc::strong_count(current) == 2
        });
    }
}

impl<T, E> RequestDeduplicator<T, E> {
    /// Keys with an execution currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Underlying operations actually run
    #[must_use]
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Callers that shared someone else's execution
    #[must_use]
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_execution() {
        let dedup: Arc<RequestDeduplicator<u32, String>> = Arc::new(RequestDeduplicator::new("test"));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let dedup = dedup.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                dedup
                    .execute("events:all", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.executions(), 1);
        assert_eq!(dedup.coalesced(), 9);
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_shared_too() {
        let dedup: RequestDeduplicator<u32, String> = RequestDeduplicator::new("test");
        let calls = AtomicUsize::new(0);

        let op = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<u32, String>("backend down".into())
        };
        let (a, b, c) = tokio::join!(
            dedup.execute("k", op),
            dedup.execute("k", op),
            dedup.execute("k", op),
        );

        assert_eq!(a, Err("backend down".to_string()));
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sequential_calls_re_execute() {
        let dedup: RequestDeduplicator<usize, String> = RequestDeduplicator::new("test");
        let calls = AtomicUsize::new(0);

        let first = dedup.execute("k", || async { Ok(calls.fetch_add(1, Ordering::SeqCst)) }).await;
        let second = dedup.execute("k", || async { Ok(calls.fetch_add(1, Ordering::SeqCst)) }).await;

        assert_eq!(first, Ok(0));
        assert_eq!(second, Ok(1));
        assert!(!dedup.is_in_flight("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_do_not_coalesce() {
        let dedup: RequestDeduplicator<&'static str, String> = RequestDeduplicator::new("test");

        let slow = |v: &'static str| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(v)
        };
        let (a, b) = tokio::join!(
            dedup.execute("a", || slow("a")),
            dedup.execute("b", || slow("b")),
        );

        assert_eq!((a, b), (Ok("a"), Ok("b")));
        assert_eq!(dedup.executions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_unregisters_key() {
        let dedup: Arc<RequestDeduplicator<u32, String>> = Arc::new(RequestDeduplicator::new("test"));

        let d = dedup.clone();
        let task = tokio::spawn(async move {
            d.execute("k", || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(dedup.is_in_flight("k"));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(dedup.in_flight(), 0);
        assert!(!dedup.is_in_flight("k"));

        // The next caller runs its own operation
        assert_eq!(dedup.execute("k", || async { Ok(2) }).await, Ok(2));
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_takes_over_from_cancelled_caller() {
        let dedup: Arc<RequestDeduplicator<u32, String>> = Arc::new(RequestDeduplicator::new("test"));

        let d = dedup.clone();
        let first = tokio::spawn(async move {
            d.execute("k", || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        let d = dedup.clone();
        let second = tokio::spawn(async move {
            d.execute("k", || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(2)
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        // The waiter still holds the slot
        assert!(dedup.is_in_flight("k"));

        assert_eq!(second.await.unwrap(), Ok(2));
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_visible_while_running() {
        let dedup: Arc<RequestDeduplicator<u32, String>> = Arc::new(RequestDeduplicator::new("test"));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let d = dedup.clone();
        let task = tokio::spawn(async move {
            d.execute("slow", || async move {
                let _ = rx.await;
                Ok(1)
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(dedup.in_flight(), 1);
        assert!(dedup.is_in_flight("slow"));

        tx.send(()).unwrap();
        assert_eq!(task.await.unwrap(), Ok(1));
        assert_eq!(dedup.in_flight(), 0);
    }
}
