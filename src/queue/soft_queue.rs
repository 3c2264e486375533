// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded-concurrency admission queue with retries.
//!
//! `enqueue` appends and returns at once. At most `max_concurrent` tasks are
//! ever processing; the rest wait in strict FIFO order. A failed task goes
//! back to the tail (after an optional backoff) until its retry budget is
//! spent, then it is reported as failed.
//!
//! # Flow
//!
//! ```text
//! enqueue ──► [ waiting (FIFO) ] ──pump──► processing (≤ max_concurrent)
//!                   ▲                           │
//!                   │  retries < max            │ error
//!                   └───────── backoff ◄────────┤
//!                                               │ ok / budget spent
//!                                               ▼
//!                                     TaskOutcome broadcast, task forgotten
//! ```
//!
//! Tasks live only in memory. A crash loses everything queued or in flight:
//! delivery is best effort, at most once per attempt, never guaranteed.
//! Terminal tasks are not retained; subscribe to outcomes to persist them.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::{EnqueueAck, QueueError, QueueStats, QueuedTask, TaskError, TaskOutcome, TaskStatus};
use crate::clock::SharedClock;
use crate::resilience::retry::{RetryDecision, RetryPolicy};
use crate::supervisor::TaskSupervisor;

const OUTCOME_CHANNEL_CAPACITY: usize = 1024;

/// The work a queue worker performs for each task.
#[async_trait]
pub trait TaskProcessor<P>: Send + Sync {
    async fn process(&self, task: &QueuedTask<P>) -> Result<(), TaskError>;
}

/// Configuration for a soft queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 20,
            retry: RetryPolicy::default(),
        }
    }
}

struct QueueState<P> {
    waiting: VecDeque<QueuedTask<P>>,
    processing: HashMap<String, QueuedTask<P>>,
    backing_off: HashMap<String, QueuedTask<P>>,
}

impl<P> QueueState<P> {
    fn contains(&self, id: &str) -> bool {
        self.processing.contains_key(id)
            || self.backing_off.contains_key(id)
            || self.waiting.iter().any(|t| t.id == id)
    }
}

struct QueueInner<P> {
    name: String,
    config: QueueConfig,
    processor: Arc<dyn TaskProcessor<P>>,
    state: Mutex<QueueState<P>>,
    supervisor: TaskSupervisor,
    clock: SharedClock,
    closed: AtomicBool,
    outcomes: broadcast::Sender<TaskOutcome>,
    outstanding: watch::Sender<usize>,
}

/// Soft admission queue. Cheap to clone; clones share the same queue.
pub struct SoftQueue<P> {
    inner: Arc<QueueInner<P>>,
}

impl<P> Clone for SoftQueue<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P> SoftQueue<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        config: QueueConfig,
        processor: Arc<dyn TaskProcessor<P>>,
        supervisor: TaskSupervisor,
        clock: SharedClock,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);
        let (outstanding, _) = watch::channel(0);
        let config = QueueConfig {
            max_concurrent: config.max_concurrent.max(1),
            ..config
        };
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                config,
                processor,
                state: Mutex::new(QueueState {
                    waiting: VecDeque::new(),
                    processing: HashMap::new(),
                    backing_off: HashMap::new(),
                }),
                supervisor,
                clock,
                closed: AtomicBool::new(false),
                outcomes,
                outstanding,
            }),
        }
    }

    /// Accept a task for background processing. Never waits on the work.
    pub fn enqueue(&self, id: impl Into<String>, payload: P) -> Result<EnqueueAck, QueueError> {
        let id = id.into();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        {
            let mut state = self.inner.state.lock();
            if state.contains(&id) {
                return Err(QueueError::DuplicateTask(id));
            }
            state.waiting.push_back(QueuedTask {
                id: id.clone(),
                payload,
                enqueued_at: self.inner.clock.now(),
                status: TaskStatus::Pending,
                retries: 0,
            });
        }
        self.inner.outstanding.send_modify(|n| *n += 1);
        crate::metrics::record_queue_enqueue(&self.inner.name);
        debug!(queue = %self.inner.name, task_id = %id, "Task enqueued");

        QueueInner::pump(&self.inner);
        Ok(EnqueueAck::queued(id))
    }

    /// Point-in-time status. `None` once the task has left the queue.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        let state = self.inner.state.lock();
        if let Some(task) = state.processing.get(id) {
            return Some(task.status);
        }
        state
            .waiting
            .iter()
            .find(|t| t.id == id)
            .or_else(|| state.backing_off.get(id))
            .map(|t| t.status)
    }

    /// Retries already spent by a task still in the queue
    #[must_use]
    pub fn retries(&self, id: &str) -> Option<u32> {
        let state = self.inner.state.lock();
        state
            .processing
            .get(id)
            .or_else(|| state.backing_off.get(id))
            .or_else(|| state.waiting.iter().find(|t| t.id == id))
            .map(|t| t.retries)
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        let pending = state.waiting.len() + state.backing_off.len();
        let processing = state.processing.len();
        QueueStats {
            queue_length: pending + processing,
            active_count: processing,
            pending,
            processing,
        }
    }

    /// Terminal outcomes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TaskOutcome> {
        self.inner.outcomes.subscribe()
    }

    /// Refuse new tasks. Already accepted tasks still run to a terminal state.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            info!(queue = %self.inner.name, "Queue closed to new tasks");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Wait until every accepted task has reached a terminal state.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.inner.config.max_concurrent
    }
}

impl<P> QueueInner<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Start workers for waiting tasks while slots are free.
    fn pump(this: &Arc<Self>) {
        loop {
            let task = {
                let mut state = this.state.lock();
                if state.processing.len() >= this.config.max_concurrent {
                    break;
                }
                let Some(mut task) = state.waiting.pop_front() else {
                    break;
                };
                task.status = TaskStatus::Processing;
                state.processing.insert(task.id.clone(), task.clone());
                crate::metrics::set_queue_depth(&this.name, state.waiting.len(), state.processing.len());
                task
            };

            let worker = this.clone();
            this.supervisor.spawn("queue_worker", async move {
                worker.work(task).await;
            });
        }
    }

    async fn work(self: Arc<Self>, task: QueuedTask<P>) {
        let mut slot = ActiveSlot {
            queue: self.clone(),
            task_id: task.id.clone(),
            attempts: task.retries + 1,
            armed: true,
        };
        let wait = self.clock.now().saturating_duration_since(task.enqueued_at);
        debug!(queue = %self.name, task_id = %task.id, retries = task.retries, waited_ms = wait.as_millis() as u64, "Processing task");

        let result = self.processor.process(&task).await;
        slot.armed = false;

        match result {
            Ok(()) => {
                self.state.lock().processing.remove(&task.id);
                self.finish(TaskOutcome {
                    task_id: task.id,
                    status: TaskStatus::Completed,
                    attempts: task.retries + 1,
                    error: None,
                });
            }
            Err(e) => self.retry_or_fail(task, e),
        }
        Self::pump(&self);
    }

    fn retry_or_fail(self: &Arc<Self>, mut task: QueuedTask<P>, error: TaskError) {
        let decision = self.config.retry.decide(task.retries);
        let mut state = self.state.lock();
        state.processing.remove(&task.id);

        match decision {
            RetryDecision::Requeue { delay } => {
                task.retries += 1;
                task.status = TaskStatus::Pending;
                debug!(queue = %self.name, task_id = %task.id, retries = task.retries, error = %error, "Task failed, re-queued at tail");
                crate::metrics::record_queue_retry(&self.name);

                if delay.is_zero() {
                    state.waiting.push_back(task);
                    return;
                }
                let id = task.id.clone();
                state.backing_off.insert(id.clone(), task);
                drop(state);

                let queue = self.clone();
                self.supervisor.spawn("queue_backoff", async move {
                    tokio::time::sleep(delay).await;
                    {
                        let mut state = queue.state.lock();
                        if let Some(task) = state.backing_off.remove(&id) {
                            state.waiting.push_back(task);
                        }
                    }
                    Self::pump(&queue);
                });
            }
            RetryDecision::GiveUp => {
                drop(state);
                warn!(queue = %self.name, task_id = %task.id, attempts = task.retries + 1, error = %error, "Task failed permanently");
                self.finish(TaskOutcome {
                    task_id: task.id,
                    status: TaskStatus::Failed,
                    attempts: task.retries + 1,
                    error: Some(error.to_string()),
                });
            }
        }
    }

    fn finish(&self, outcome: TaskOutcome) {
        crate::metrics::record_queue_outcome(&self.name, outcome.status.as_str());
        {
            let state = self.state.lock();
            crate::metrics::set_queue_depth(&self.name, state.waiting.len(), state.processing.len());
        }
        // No subscribers is fine
        let _ = self.outcomes.send(outcome);
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Frees a worker slot if processing unwinds without reporting a result.
struct ActiveSlot<P>
where
    P: Clone + Send + Sync + 'static,
{
    queue: Arc<QueueInner<P>>,
    task_id: String,
    attempts: u32,
    armed: bool,
}

impl<P> Drop for ActiveSlot<P>
where
    P: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let removed = self.queue.state.lock().processing.remove(&self.task_id).is_some();
        if removed {
            warn!(queue = %self.queue.name, task_id = %self.task_id, "Worker aborted, task marked failed");
            self.queue.finish(TaskOutcome {
                task_id: std::mem::take(&mut self.task_id),
                status: TaskStatus::Failed,
                attempts: self.attempts,
                error: Some("worker aborted".to_string()),
            });
            QueueInner::pump(&self.queue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::retry::BackoffConfig;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Records processing order and peak concurrency.
    struct Recorder {
        order: Mutex<Vec<String>>,
        current: AtomicUsize,
        peak: AtomicUsize,
        work: Duration,
        fail_ids: Vec<&'static str>,
    }

    impl Recorder {
        fn new(work: Duration, fail_ids: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                order: Mutex::new(Vec::new()),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                work,
                fail_ids,
            })
        }

        fn order(&self) -> Vec<String> {
            self.order.lock().clone()
        }
    }

    #[async_trait]
    impl TaskProcessor<u32> for Recorder {
        async fn process(&self, task: &QueuedTask<u32>) -> Result<(), TaskError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().push(task.id.clone());
            assert_eq!(task.status, TaskStatus::Processing);

            tokio::time::sleep(self.work).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.fail_ids.contains(&task.id.as_str()) {
                Err(TaskError::new("gateway declined"))
            } else {
                Ok(())
            }
        }
    }

    fn queue(config: QueueConfig, processor: Arc<Recorder>) -> SoftQueue<u32> {
        SoftQueue::new("payments", config, processor, TaskSupervisor::new(), crate::clock::system())
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_acknowledges_immediately() {
        let recorder = Recorder::new(Duration::from_secs(60), vec![]);
        let q = queue(QueueConfig::default(), recorder);

        let ack = q.enqueue("t-1", 5).unwrap();
        assert_eq!(ack.task_id, "t-1");
        assert_eq!(ack.status, "queued");
        assert_eq!(q.stats().queue_length, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_limit() {
        let recorder = Recorder::new(Duration::from_millis(20), vec![]);
        let config = QueueConfig {
            max_concurrent: 3,
            ..Default::default()
        };
        let q = queue(config, recorder.clone());

        for i in 0..25 {
            q.enqueue(format!("t-{i}"), i).unwrap();
        }
        let stats = q.stats();
        assert_eq!(stats.queue_length, 25);
        assert!(stats.processing <= 3);

        q.wait_idle().await;
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 3);
        assert_eq!(recorder.order().len(), 25);
        assert_eq!(q.stats().queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_admission() {
        let recorder = Recorder::new(Duration::from_millis(5), vec![]);
        let config = QueueConfig {
            max_concurrent: 1,
            ..Default::default()
        };
        let q = queue(config, recorder.clone());

        for id in ["a", "b", "c", "d"] {
            q.enqueue(id, 0).unwrap();
        }
        q.wait_idle().await;

        assert_eq!(recorder.order(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_task_gets_four_attempts() {
        let recorder = Recorder::new(Duration::from_millis(1), vec!["bad"]);
        let q = queue(QueueConfig::default(), recorder.clone());
        let mut outcomes = q.subscribe();

        q.enqueue("bad", 1).unwrap();
        let outcome = outcomes.recv().await.unwrap();

        assert_eq!(outcome.task_id, "bad");
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.error.as_deref(), Some("gateway declined"));
        assert_eq!(recorder.order().len(), 4);
        // Terminal tasks are forgotten
        assert_eq!(q.status("bad"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rotate_behind_newer_tasks() {
        let recorder = Recorder::new(Duration::from_millis(1), vec!["A"]);
        let config = QueueConfig {
            max_concurrent: 1,
            ..Default::default()
        };
        let q = queue(config, recorder.clone());
        let mut outcomes = q.subscribe();

        q.enqueue("A", 1).unwrap();
        q.enqueue("B", 2).unwrap();
        q.wait_idle().await;

        assert_eq!(recorder.order(), vec!["A", "B", "A", "A", "A"]);
        let first = outcomes.recv().await.unwrap();
        let second = outcomes.recv().await.unwrap();
        assert_eq!((first.task_id.as_str(), first.status), ("B", TaskStatus::Completed));
        assert_eq!((second.task_id.as_str(), second.status), ("A", TaskStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_lookup_while_queued() {
        let recorder = Recorder::new(Duration::from_secs(10), vec![]);
        let config = QueueConfig {
            max_concurrent: 1,
            ..Default::default()
        };
        let q = queue(config, recorder);

        q.enqueue("first", 1).unwrap();
        q.enqueue("second", 2).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(q.status("first"), Some(TaskStatus::Processing));
        assert_eq!(q.status("second"), Some(TaskStatus::Pending));
        assert_eq!(q.status("unknown"), None);
        let stats = q.stats();
        assert_eq!((stats.pending, stats.processing, stats.active_count), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_and_closed_are_rejected() {
        let recorder = Recorder::new(Duration::from_secs(10), vec![]);
        let q = queue(QueueConfig::default(), recorder);

        q.enqueue("dup", 1).unwrap();
        assert_eq!(q.enqueue("dup", 2), Err(QueueError::DuplicateTask("dup".into())));

        q.close();
        assert!(q.is_closed());
        assert_eq!(q.enqueue("late", 3), Err(QueueError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_readmission() {
        let recorder = Recorder::new(Duration::from_millis(1), vec!["slow-fail"]);
        let config = QueueConfig {
            max_concurrent: 4,
            retry: RetryPolicy::with_backoff(
                1,
                BackoffConfig {
                    initial_delay_ms: 1_000,
                    max_delay_ms: 1_000,
                    factor: 2.0,
                },
            ),
        };
        let q = queue(config, recorder.clone());

        q.enqueue("slow-fail", 1).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(q.status("slow-fail"), Some(TaskStatus::Pending));
        assert_eq!(q.retries("slow-fail"), Some(1));
        assert_eq!(recorder.order().len(), 1);

        q.wait_idle().await;
        assert_eq!(recorder.order().len(), 2);
    }

    struct Panicking;

    #[async_trait]
    impl TaskProcessor<u32> for Panicking {
        async fn process(&self, _task: &QueuedTask<u32>) -> Result<(), TaskError> {
            panic!("processor bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_frees_its_slot() {
        let q: SoftQueue<u32> = SoftQueue::new(
            "payments",
            QueueConfig {
                max_concurrent: 1,
                ..Default::default()
            },
            Arc::new(Panicking),
            TaskSupervisor::new(),
            crate::clock::system(),
        );
        let mut outcomes = q.subscribe();

        q.enqueue("p1", 1).unwrap();
        q.enqueue("p2", 2).unwrap();

        let a = outcomes.recv().await.unwrap();
        let b = outcomes.recv().await.unwrap();
        assert_eq!(a.status, TaskStatus::Failed);
        assert_eq!(b.status, TaskStatus::Failed);
        q.wait_idle().await;
        assert_eq!(q.stats().active_count, 0);
    }
}
