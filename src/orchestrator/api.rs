// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request handling: cached reads, queued writes, analytics and task status.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::routes::{cache_key, request_key, CachePolicy, Route};
use super::types::{CacheStatus, Params, QueuedRequest, RouteRequest, RouteResponse};
use super::{LoadOrchestrator, ReadDeduplicator};
use crate::batching::AnalyticsEvent;
use crate::cache::{CacheLookup, SmartCache};
use crate::error::LoadError;
use crate::metrics::LatencyTimer;
use crate::monitor::LoadStatus;
use crate::queue::{EnqueueAck, TaskOutcome, TaskStatus};
use crate::resilience::BreakerSet;

impl LoadOrchestrator {
    // ═══════════════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════════════

    /// Serve `request` on `path` according to the route's policy.
    ///
    /// Never fails: every outcome, including overload, is a [`RouteResponse`]
    /// with the matching status code and body.
    pub async fn handle(&self, path: &str, request: RouteRequest) -> RouteResponse {
        let Some(route) = self.routes.get(path) else {
            debug!(route = %path, "No route registered");
            let response = RouteResponse::error(&LoadError::UnknownRoute(path.to_string()));
            crate::metrics::record_route_response("unmatched", response.status.as_u16(), "bypass");
            return response;
        };

        let response = if route.policy.queue {
            match self.enqueue(path, request) {
                Ok(ack) => RouteResponse::accepted(ack),
                Err(e) => {
                    warn!(route = %path, error = %e, "Submission refused");
                    RouteResponse::error(&e)
                }
            }
        } else {
            self.read(path, route, request).await
        };

        let cache = response.cache_status.map_or("bypass", |s| s.as_str());
        crate::metrics::record_route_response(path, response.status.as_u16(), cache);
        response
    }

    /// Accept a write for background processing on a queued route.
    pub fn enqueue(&self, path: &str, mut request: RouteRequest) -> Result<EnqueueAck, LoadError> {
        if self.routes.get(path).is_none() {
            return Err(LoadError::UnknownRoute(path.to_string()));
        }
        let task_id = request.task_id.take().unwrap_or_else(|| Uuid::new_v4().to_string());
        let payload = QueuedRequest {
            route: path.to_string(),
            request,
        };
        Ok(self.queue.enqueue(task_id, payload)?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Read path
    // ═══════════════════════════════════════════════════════════════════════════

    async fn read(&self, path: &str, route: Route, request: RouteRequest) -> RouteResponse {
        let _timer = LatencyTimer::new("route", "read");
        let key = request_key(path, &request);

        let Some(policy) = route.policy.effective_cache().cloned() else {
            return match self.fetch(&key, &route, request, None).await {
                Ok(value) => RouteResponse::ok(value),
                Err(e) => {
                    warn!(route = %path, error = %e, "Uncached route failed");
                    RouteResponse::error(&e)
                }
            };
        };
        let Some(cache) = self.caches.region(&policy.region).cloned() else {
            return RouteResponse::error(&LoadError::UnknownRegion(policy.region));
        };

        let expired = match cache.lookup(&key) {
            CacheLookup::Fresh(value) => {
                return RouteResponse::cached(value, CacheStatus::Hit, policy.cache_control());
            }
            CacheLookup::Stale(value) => {
                self.revalidate(key, route, request, cache, policy.ttl());
                return RouteResponse::cached(value, CacheStatus::Stale, policy.cache_control());
            }
            CacheLookup::Expired(value) => Some(value),
            CacheLookup::Miss => None,
        };

        match self.fetch(&key, &route, request, Some((&cache, &policy))).await {
            Ok(value) => RouteResponse::cached(value, CacheStatus::Miss, policy.cache_control()),
            Err(e) => {
                let fallback = expired.or_else(|| self.last_known.get(&key).map(|v| v.value().clone()));
                match fallback {
                    Some(value) => {
                        warn!(route = %path, key = %key, error = %e, "Serving last-known value after failure");
                        RouteResponse::stale_fallback(value, self.config.stale_fallback_max_age_secs)
                    }
                    None => {
                        warn!(route = %path, key = %key, error = %e, "No cached fallback, overloaded");
                        RouteResponse::error(&e)
                    }
                }
            }
        }
    }

    /// Run the handler through the dedup and the route's breaker.
    async fn fetch(
        &self,
        key: &str,
        route: &Route,
        request: RouteRequest,
        store: Option<(&SmartCache<Value>, &CachePolicy)>,
    ) -> Result<Value, LoadError> {
        self.reader()
            .fetch(key, route, request, store.map(|(cache, policy)| (cache, policy.ttl())))
            .await
    }

    fn reader(&self) -> Reader {
        Reader {
            breakers: self.breakers.clone(),
            dedup: self.dedup.clone(),
            last_known: self.last_known.clone(),
        }
    }

    /// Refresh a stale entry in the background. Failures keep the stale entry.
    fn revalidate(
        &self,
        key: String,
        route: Route,
        request: RouteRequest,
        cache: Arc<SmartCache<Value>>,
        ttl: Duration,
    ) {
        if self.dedup.is_in_flight(&key) {
            debug!(key = %key, "Refresh already in flight");
            return;
        }

        let reader = self.reader();
        self.supervisor.spawn("revalidate", async move {
            match reader.fetch(&key, &route, request, Some((&cache, ttl))).await {
                Ok(_) => debug!(key = %key, "Stale entry revalidated"),
                Err(e) => debug!(key = %key, error = %e, "Revalidation failed, keeping stale entry"),
            }
        });
    }

    /// Drop the cached and last-known value for a route + params.
    ///
    /// Addresses the bodyless read of that route; this is also the only way
    /// last-known values leave memory.
    pub fn invalidate(&self, path: &str, params: &Params) -> bool {
        let key = cache_key(path, params);
        let Some(route) = self.routes.get(path) else {
            return false;
        };
        let mut removed = self.last_known.remove(&key).is_some();
        if let Some(policy) = route.policy.effective_cache() {
            if let Some(cache) = self.caches.region(&policy.region) {
                removed |= cache.delete(&key);
            }
        }
        debug!(key = %key, removed, "Cache invalidated");
        removed
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Analytics, tasks, status
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fire-and-forget analytics. Never blocks, never fails.
    pub fn track(&self, event: AnalyticsEvent) {
        self.analytics.track(event);
    }

    /// Point-in-time status of a queued task. `None` once it left the queue.
    #[must_use]
    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.queue.status(task_id)
    }

    /// Terminal task outcomes, for collaborators that persist durable status
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<TaskOutcome> {
        self.queue.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> LoadStatus {
        self.monitor.snapshot()
    }
}

/// Owned handles to the read path, so a detached revalidation can run it.
struct Reader {
    breakers: Arc<BreakerSet>,
    dedup: Arc<ReadDeduplicator>,
    last_known: Arc<DashMap<String, Value>>,
}

impl Reader {
    /// Populates the cache inside the shared execution, so coalesced
    /// callers write once.
    async fn fetch(
        &self,
        key: &str,
        route: &Route,
        request: RouteRequest,
        store: Option<(&SmartCache<Value>, Duration)>,
    ) -> Result<Value, LoadError> {
        let breaker = self.breakers.get(route.policy.class);
        let handler = route.handler.clone();
        let last_known = &self.last_known;
        self.dedup
            .execute(key, || async move {
                let value = breaker.call(|| handler.handle(request)).await?;
                if let Some((cache, ttl)) = store {
                    cache.set(key, value.clone(), ttl);
                    last_known.insert(key.to_string(), value.clone());
                }
                Ok(value)
            })
            .await
            .map_err(LoadError::from)
    }
}
