// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Load orchestrator.
//!
//! The [`LoadOrchestrator`] is the composition root. It owns one instance of
//! every component and applies them per route:
//! - Circuit breakers, one per [`OperationClass`]
//! - Smart cache regions with stale-while-revalidate reads
//! - Request deduplication for concurrent misses
//! - The payment soft queue for write routes
//! - The analytics batch collector
//!
//! # Read path
//!
//! ```text
//! fresh hit ──────────────────────────────► 200 (X-Cache-Status: hit)
//! stale hit ── spawn revalidation ────────► 200 (X-Cache-Status: stale)
//! miss ── dedup ── breaker ── handler
//!            ok ── populate cache ────────► 200 (X-Cache-Status: miss)
//!            err ── last-known value? ────► 200 (X-Cache-Status: stale, short max-age)
//!                   nothing cached ───────► 503 SERVICE_OVERLOADED
//! ```
//!
//! # Write path
//!
//! Queued routes go straight to the soft queue and answer `202 Accepted`.
//! A queue worker later runs the route handler behind the route's breaker.
//!
//! # Example
//!
//! ```rust,no_run
//! use load_control::orchestrator::{CachePolicy, LoadOrchestrator, RoutePolicy, RouteRequest};
//! use load_control::{HandlerError, LoadControlConfig};
//! use load_control::batching::{AnalyticsEvent, BatchSink, SinkError};
//! use async_trait::async_trait;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Discard;
//!
//! #[async_trait]
//! impl BatchSink<AnalyticsEvent> for Discard {
//!     async fn submit(&self, _batch: Vec<AnalyticsEvent>) -> Result<(), SinkError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let orchestrator = LoadOrchestrator::new(LoadControlConfig::default(), Arc::new(Discard));
//! orchestrator
//!     .register(
//!         "/api/events",
//!         RoutePolicy::cached(CachePolicy::new("events", 60)),
//!         |_req: RouteRequest| async { Ok::<_, HandlerError>(json!([{"id": 1}])) },
//!     )
//!     .unwrap();
//!
//! let response = orchestrator.handle("/api/events", RouteRequest::new()).await;
//! assert_eq!(response.status, 200);
//! # }
//! ```

mod api;
pub mod http;
mod routes;
mod types;

pub use http::{router, status_router};
pub use routes::{cache_key, request_key, CachePolicy, RoutePolicy};
pub use types::{CacheStatus, Params, QueuedRequest, RouteHandler, RouteRequest, RouteResponse};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::batching::{AnalyticsEvent, BatchCollector, BatchSink, SinkError};
use crate::cache::CacheRegions;
use crate::clock::{self, SharedClock};
use crate::config::LoadControlConfig;
use crate::dedup::RequestDeduplicator;
use crate::error::{HandlerError, LoadError};
use crate::monitor::LoadStatusMonitor;
use crate::queue::{QueuedTask, SoftQueue, TaskError, TaskProcessor};
use crate::resilience::{BreakerSet, CircuitError, OperationClass};
use crate::supervisor::TaskSupervisor;

use routes::{Route, RouteTable};

pub(crate) type ReadDeduplicator = RequestDeduplicator<Value, CircuitError<HandlerError>>;

/// Composition root for load control.
///
/// # Thread Safety
///
/// `Send + Sync`; share it behind an `Arc`. Components are reference counted
/// internally so background work can outlive the request that started it.
pub struct LoadOrchestrator {
    pub(super) config: LoadControlConfig,

    /// Supervises revalidations, queue workers and batch flushes
    pub(super) supervisor: TaskSupervisor,

    /// One breaker per operation class
    pub(super) breakers: Arc<BreakerSet>,

    /// Named cache regions
    pub(super) caches: Arc<CacheRegions<Value>>,

    /// Last successful value per cache key, kept past expiry as an outage fallback.
    ///
    /// Entries are never expired, only replaced or removed by `invalidate`,
    /// so this holds one value per distinct key ever served. Keep the
    /// parameter space of cached routes bounded, as for the cache regions.
    pub(super) last_known: Arc<DashMap<String, Value>>,

    /// Coalesces concurrent misses and revalidations per request key
    pub(super) dedup: Arc<ReadDeduplicator>,

    pub(super) routes: Arc<RouteTable>,

    /// Payment queue
    pub(super) queue: SoftQueue<QueuedRequest>,

    /// Analytics batcher
    pub(super) analytics: BatchCollector<AnalyticsEvent>,

    pub(super) monitor: LoadStatusMonitor,
}

impl LoadOrchestrator {
    /// Create an orchestrator on the system clock.
    ///
    /// `analytics_sink` receives flushed analytics batches. Must be called
    /// inside a Tokio runtime if routes will be served.
    pub fn new(config: LoadControlConfig, analytics_sink: Arc<dyn BatchSink<AnalyticsEvent>>) -> Self {
        Self::with_clock(config, analytics_sink, clock::system())
    }

    /// Create an orchestrator reading time from `clock`.
    pub fn with_clock(
        config: LoadControlConfig,
        analytics_sink: Arc<dyn BatchSink<AnalyticsEvent>>,
        clock: SharedClock,
    ) -> Self {
        let supervisor = TaskSupervisor::new();
        let breakers = Arc::new(BreakerSet::new(
            config.fast_path.clone(),
            config.payments.clone(),
            config.analytics.clone(),
            clock.clone(),
        ));
        let caches = Arc::new(CacheRegions::new(
            config.cache_regions.iter().cloned(),
            config.stale_fraction,
            clock.clone(),
        ));
        let last_known = Arc::new(DashMap::new());
        let dedup = Arc::new(ReadDeduplicator::new("reads"));
        let routes = Arc::new(RouteTable::default());

        let worker = Arc::new(RouteWorker {
            routes: routes.clone(),
            breakers: breakers.clone(),
        });
        let queue = SoftQueue::new("payments", config.queue_config(), worker, supervisor.clone(), clock);

        let sink = Arc::new(BreakerGuardedSink {
            breakers: breakers.clone(),
            inner: analytics_sink,
        });
        let analytics = BatchCollector::new("analytics", config.batch_config(), sink, supervisor.clone());

        let monitor = LoadStatusMonitor::new(
            breakers.clone(),
            caches.clone(),
            last_known.clone(),
            queue.clone(),
            analytics.clone(),
            dedup.clone(),
            supervisor.clone(),
        );

        info!(
            regions = ?caches.names(),
            queue_max_concurrent = queue.max_concurrent(),
            "Load orchestrator created"
        );

        Self {
            config,
            supervisor,
            breakers,
            caches,
            last_known,
            dedup,
            routes,
            queue,
            analytics,
            monitor,
        }
    }

    /// Register (or replace) the handler and policy for `path`.
    ///
    /// Fails if the policy names a cache region that was not configured.
    pub fn register<H>(&self, path: impl Into<String>, policy: RoutePolicy, handler: H) -> Result<(), LoadError>
    where
        H: RouteHandler + 'static,
    {
        let path = path.into();
        if let Some(cache) = policy.effective_cache() {
            if self.caches.region(&cache.region).is_none() {
                return Err(LoadError::UnknownRegion(cache.region.clone()));
            }
        }

        debug!(route = %path, queue = policy.queue, class = %policy.class, "Registering route");
        let replaced = self.routes.insert(
            path.clone(),
            Route {
                policy,
                handler: Arc::new(handler),
            },
        );
        if replaced {
            info!(route = %path, "Route handler replaced");
        }
        Ok(())
    }

    /// Registered route paths, sorted
    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        self.routes.paths()
    }

    #[must_use]
    pub fn config(&self) -> &LoadControlConfig {
        &self.config
    }

    #[must_use]
    pub fn breakers(&self) -> &BreakerSet {
        &self.breakers
    }

    #[must_use]
    pub fn caches(&self) -> &CacheRegions<Value> {
        &self.caches
    }

    #[must_use]
    pub fn queue(&self) -> &SoftQueue<QueuedRequest> {
        &self.queue
    }

    #[must_use]
    pub fn analytics(&self) -> &BatchCollector<AnalyticsEvent> {
        &self.analytics
    }

    #[must_use]
    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    #[must_use]
    pub fn monitor(&self) -> &LoadStatusMonitor {
        &self.monitor
    }

    /// Stop admitting queued work, drain the queue, flush analytics and
    /// wait for background tasks.
    pub async fn shutdown(&self) {
        info!("Load orchestrator shutting down");
        self.queue.close();
        self.queue.wait_idle().await;
        self.analytics.shutdown().await;
        self.supervisor.shutdown().await;
        info!("Load orchestrator stopped");
    }
}

/// Runs queued route handlers behind the route's breaker.
struct RouteWorker {
    routes: Arc<RouteTable>,
    breakers: Arc<BreakerSet>,
}

#[async_trait]
impl TaskProcessor<QueuedRequest> for RouteWorker {
    async fn process(&self, task: &QueuedTask<QueuedRequest>) -> Result<(), TaskError> {
        let route = self
            .routes
            .get(&task.payload.route)
            .ok_or_else(|| TaskError::new(format!("no route registered for '{}'", task.payload.route)))?;

        let breaker = self.breakers.get(route.policy.class);
        let request = task.payload.request.clone();
        breaker
            .call(|| route.handler.handle(request))
            .await
            .map(|_| ())
            .map_err(|e| TaskError::new(e.to_string()))
    }
}

/// Analytics submissions go through the analytics breaker.
struct BreakerGuardedSink {
    breakers: Arc<BreakerSet>,
    inner: Arc<dyn BatchSink<AnalyticsEvent>>,
}

#[async_trait]
impl BatchSink<AnalyticsEvent> for BreakerGuardedSink {
    async fn submit(&self, batch: Vec<AnalyticsEvent>) -> Result<(), SinkError> {
        let breaker = self.breakers.get(OperationClass::Analytics);
        match breaker.call(|| self.inner.submit(batch)).await {
            Ok(()) => Ok(()),
            Err(CircuitError::Rejected) => Err(SinkError("analytics circuit open".to_string())),
            Err(CircuitError::Inner(e)) => Err(e),
        }
    }
}
