// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Load Control
//!
//! An adaptive load-control layer that sits in front of backend operations
//! (data reads, payment submissions, analytics writes) and protects them from
//! overload without removing functionality.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Load Orchestrator                       │
//! │  • Per-route policy: cached read, uncached read, queued     │
//! │  • HTTP semantics: Cache-Control, X-Cache-Status, 202, 503  │
//! └─────────────────────────────────────────────────────────────┘
//!          │ reads                    │ writes          │ telemetry
//!          ▼                          ▼                 ▼
//! ┌──────────────────┐   ┌──────────────────────┐  ┌──────────────────┐
//! │   Smart Cache    │   │      Soft Queue      │  │ Batch Collector  │
//! │ fresh/stale/gone │   │ bounded workers,     │  │ size or time     │
//! │ per region       │   │ FIFO, retry budget   │  │ flush, lossy     │
//! └──────────────────┘   └──────────────────────┘  └──────────────────┘
//!          │ miss                     │                 │
//!          ▼                          │                 │
//! ┌──────────────────┐                │                 │
//! │  Deduplicator    │                │                 │
//! │ one call per key │                │                 │
//! └──────────────────┘                │                 │
//!          │                          │                 │
//!          ▼                          ▼                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │       Circuit Breakers (fast path · payments · analytics)   │
//! │  • Slow successes count as failures                         │
//! │  • Open → fallback or fail fast; one probe after cooldown   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    wrapped route handlers
//! ```
//!
//! The [`LoadStatusMonitor`] reads every component's counters for dashboards.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use load_control::orchestrator::{router, CachePolicy, RoutePolicy, RouteRequest};
//! use load_control::batching::{AnalyticsEvent, BatchSink, SinkError};
//! use load_control::{HandlerError, LoadControlConfig, LoadOrchestrator};
//! use async_trait::async_trait;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct IngestClient;
//!
//! #[async_trait]
//! impl BatchSink<AnalyticsEvent> for IngestClient {
//!     async fn submit(&self, batch: Vec<AnalyticsEvent>) -> Result<(), SinkError> {
//!         println!("shipping {} events", batch.len());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = Arc::new(LoadOrchestrator::new(
//!         LoadControlConfig::default(),
//!         Arc::new(IngestClient),
//!     ));
//!
//!     orchestrator
//!         .register(
//!             "/api/events",
//!             RoutePolicy::cached(CachePolicy::new("events", 300).stale_while_revalidate()),
//!             |_req: RouteRequest| async { Ok::<_, HandlerError>(json!([{"id": 1}])) },
//!         )
//!         .unwrap();
//!     orchestrator
//!         .register("/api/payments", RoutePolicy::queued(), |req: RouteRequest| async move {
//!             Ok::<_, HandlerError>(json!({ "charged": req.body }))
//!         })
//!         .unwrap();
//!
//!     let app = router(orchestrator.clone());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Deployment caveat
//!
//! All state (breakers, caches, queue, in-flight keys) is per process. Behind a
//! load balancer each instance trips, caches and queues independently. Queued
//! tasks live in memory only, so a crash loses them: delivery is at-most-once
//! effort, not at-least-once.
//!
//! ## Modules
//!
//! - [`orchestrator`]: The [`LoadOrchestrator`] composing all components per route
//! - [`resilience`]: Circuit breakers and retry policy
//! - [`cache`]: Stale-while-revalidate cache regions
//! - [`dedup`]: In-flight request coalescing
//! - [`queue`]: Soft admission queue for writes
//! - [`batching`]: Analytics batch collector
//! - [`monitor`]: Read-only status snapshot

pub mod batching;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod queue;
pub mod resilience;
pub mod supervisor;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use batching::{AnalyticsEvent, BatchCollector, BatchConfig, BatchSink, FlushReason, SinkError};
pub use cache::{CacheLookup, CacheRead, CacheRegions, SmartCache};
pub use clock::{Clock, MockClock, SharedClock, SystemClock};
pub use config::LoadControlConfig;
pub use dedup::RequestDeduplicator;
pub use error::{HandlerError, LoadError};
pub use metrics::LatencyTimer;
pub use monitor::{LoadStatus, LoadStatusMonitor};
pub use orchestrator::{CachePolicy, LoadOrchestrator, RoutePolicy, RouteRequest, RouteResponse};
pub use queue::{EnqueueAck, QueueStats, SoftQueue, TaskError, TaskOutcome, TaskProcessor, TaskStatus};
pub use resilience::{BreakerConfig, BreakerSet, CircuitBreaker, CircuitError, CircuitState, OperationClass, RetryPolicy};
pub use supervisor::TaskSupervisor;
