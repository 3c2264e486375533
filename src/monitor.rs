// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read-only load status.
//!
//! [`LoadStatusMonitor::snapshot`] gathers every component's counters into one
//! serializable [`LoadStatus`] for dashboards and alerting. It never mutates
//! component state.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use sysinfo::{Pid, ProcessExt, System, SystemExt};

use crate::batching::{AnalyticsEvent, BatchCollector};
use crate::cache::CacheRegions;
use crate::orchestrator::{QueuedRequest, ReadDeduplicator};
use crate::queue::{QueueStats, SoftQueue};
use crate::resilience::{BreakerSet, BreakerSnapshot};
use crate::supervisor::TaskSupervisor;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatus {
    /// Breaker state by operation class
    pub breakers: BTreeMap<&'static str, BreakerSnapshot>,
    /// Entry count by cache region
    pub caches: BTreeMap<String, usize>,
    /// Outage fallback values held past expiry, one per key ever served
    pub last_known_entries: usize,
    pub queue: QueueStats,
    pub analytics: AnalyticsStatus,
    pub dedup: DedupStatus,
    pub memory: MemoryUsage,
    /// Live supervised background tasks
    pub background_tasks: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsStatus {
    pub buffered: usize,
    pub delivered_events: u64,
    pub dropped_events: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupStatus {
    pub in_flight: usize,
    pub coalesced: u64,
}

/// Process memory in bytes. `None` where the platform does not report it.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub resident_bytes: Option<u64>,
    pub virtual_bytes: Option<u64>,
}

pub struct LoadStatusMonitor {
    breakers: Arc<BreakerSet>,
    caches: Arc<CacheRegions<Value>>,
    last_known: Arc<DashMap<String, Value>>,
    queue: SoftQueue<QueuedRequest>,
    analytics: BatchCollector<AnalyticsEvent>,
    dedup: Arc<ReadDeduplicator>,
    supervisor: TaskSupervisor,
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl LoadStatusMonitor {
    pub(crate) fn new(
        breakers: Arc<BreakerSet>,
        caches: Arc<CacheRegions<Value>>,
        last_known: Arc<DashMap<String, Value>>,
        queue: SoftQueue<QueuedRequest>,
        analytics: BatchCollector<AnalyticsEvent>,
        dedup: Arc<ReadDeduplicator>,
        supervisor: TaskSupervisor,
    ) -> Self {
        Self {
            breakers,
            caches,
            last_known,
            queue,
            analytics,
            dedup,
            supervisor,
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> LoadStatus {
        let analytics = self.analytics.stats();
        LoadStatus {
            breakers: self.breakers.snapshots().into_iter().collect(),
            caches: self.caches.entry_counts(),
            last_known_entries: self.last_known.len(),
            queue: self.queue.stats(),
            analytics: AnalyticsStatus {
                buffered: analytics.buffered,
                delivered_events: analytics.delivered_events,
                dropped_events: analytics.dropped_events,
            },
            dedup: DedupStatus {
                in_flight: self.dedup.in_flight(),
                coalesced: self.dedup.coalesced(),
            },
            memory: self.memory(),
            background_tasks: self.supervisor.in_flight(),
        }
    }

    /// Current process memory, refreshed on every call
    #[must_use]
    pub fn memory(&self) -> MemoryUsage {
        let Some(pid) = self.pid else {
            return MemoryUsage::default();
        };
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return MemoryUsage::default();
        }
        let usage = system
            .process(pid)
            .map(|p| MemoryUsage {
                resident_bytes: Some(p.memory()),
                virtual_bytes: Some(p.virtual_memory()),
            })
            .unwrap_or_default();
        if let Some(resident) = usage.resident_bytes {
            crate::metrics::set_resident_memory(resident);
        }
        usage
    }
}

#[cfg(test)]
mod tests {
    use crate::batching::{AnalyticsEvent, BatchSink, SinkError};
    use crate::orchestrator::LoadOrchestrator;
    use crate::LoadControlConfig;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Discard;

    #[async_trait]
    impl BatchSink<AnalyticsEvent> for Discard {
        async fn submit(&self, _batch: Vec<AnalyticsEvent>) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_snapshot_shape() {
        let orchestrator = LoadOrchestrator::new(LoadControlConfig::default(), Arc::new(Discard));
        orchestrator.track(AnalyticsEvent::new("page_view", serde_json::Value::Null));

        let status = orchestrator.monitor().snapshot();
        assert_eq!(status.breakers.len(), 3);
        assert_eq!(status.caches.len(), 4);
        assert_eq!(status.analytics.buffered, 1);
        assert_eq!(status.dedup.in_flight, 0);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["breakers"]["payments"]["state"], "CLOSED");
        assert_eq!(json["breakers"]["payments"]["failureCount"], 0);
        assert_eq!(json["caches"]["events"], 0);
        assert_eq!(json["lastKnownEntries"], 0);
        assert_eq!(json["queue"]["queueLength"], 0);
        assert!(json["memory"].get("residentBytes").is_some());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_memory_reported_on_linux() {
        let orchestrator = LoadOrchestrator::new(LoadControlConfig::default(), Arc::new(Discard));
        let memory = orchestrator.monitor().memory();
        assert!(memory.resident_bytes.unwrap_or(0) > 0);
    }
}
