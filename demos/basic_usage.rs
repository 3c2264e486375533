// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic load-control usage example.
//!
//! Demonstrates:
//! 1. Registering cached, uncached and queued routes
//! 2. Cache miss, hit and stale-while-revalidate reads
//! 3. Serving a last-known value while the backend is down
//! 4. Queued payment submissions with outcomes
//! 5. Analytics batching
//! 6. The load status snapshot and raw metrics
//! 7. Clean shutdown
//!
//! No external services are needed; backends are simulated in-process.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use load_control::batching::{AnalyticsEvent, BatchSink, SinkError};
use load_control::{
    CachePolicy, HandlerError, LoadControlConfig, LoadOrchestrator, RoutePolicy, RouteRequest,
};

/// Pretend ingest endpoint for analytics batches
struct PrintingSink;

#[async_trait]
impl BatchSink<AnalyticsEvent> for PrintingSink {
    async fn submit(&self, batch: Vec<AnalyticsEvent>) -> Result<(), SinkError> {
        let names: Vec<&str> = batch.iter().map(|e| e.name.as_str()).collect();
        println!("   └─ 📤 Analytics batch of {}: {:?}", batch.len(), names);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for inspection)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           load-control: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and register routes
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring load control...");

    let config = LoadControlConfig {
        // Flush analytics quickly for the demo
        analytics_max_batch_size: 3,
        analytics_flush_interval_ms: 200,
        ..Default::default()
    };
    let orchestrator = Arc::new(LoadOrchestrator::new(config, Arc::new(PrintingSink)));

    let db_calls = Arc::new(AtomicUsize::new(0));
    let db_up = Arc::new(AtomicBool::new(true));
    let (calls, up) = (db_calls.clone(), db_up.clone());
    orchestrator.register(
        "/api/events",
        RoutePolicy::cached(CachePolicy::new("events", 1).stale_while_revalidate()),
        move |req: RouteRequest| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let healthy = up.load(Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if !healthy {
                    return Err(HandlerError::new("database connection refused"));
                }
                let page = req.params.get("page").cloned().unwrap_or_else(|| "1".into());
                Ok(json!({"page": page, "events": ["concert", "festival"], "query": n}))
            }
        },
    )?;

    orchestrator.register("/api/profile", RoutePolicy::no_cache(), |_req: RouteRequest| async {
        Ok::<_, HandlerError>(json!({"user": "alice"}))
    })?;

    orchestrator.register("/api/payments", RoutePolicy::queued(), |req: RouteRequest| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, HandlerError>(json!({"charged": req.body}))
    })?;

    println!("   └─ Routes: {:?}", orchestrator.routes());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Cached reads
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading /api/events (with timing)...");
    for label in ["cold", "warm"] {
        let start = std::time::Instant::now();
        let response = orchestrator
            .handle("/api/events", RouteRequest::new().param("page", "1"))
            .await;
        println!(
            "   └─ {label}: {} X-Cache-Status={:?} ({:?})",
            response.status,
            response.cache_status.map(|s| s.as_str()),
            start.elapsed()
        );
    }

    println!("\n⏳ Waiting past 80% of the TTL...");
    tokio::time::sleep(Duration::from_millis(850)).await;
    let response = orchestrator
        .handle("/api/events", RouteRequest::new().param("page", "1"))
        .await;
    println!(
        "   └─ stale read: X-Cache-Status={:?}, body={}",
        response.cache_status.map(|s| s.as_str()),
        response.body
    );
    orchestrator.supervisor().wait_idle().await;
    println!("   └─ Background revalidation done, backend queries so far: {}", db_calls.load(Ordering::SeqCst));

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Backend outage
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n💥 Taking the database down...");
    db_up.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let response = orchestrator
        .handle("/api/events", RouteRequest::new().param("page", "1"))
        .await;
    println!(
        "   └─ page 1: {} fallback={} Cache-Control={:?}",
        response.status,
        response.fallback,
        response.cache_control
    );
    let response = orchestrator
        .handle("/api/events", RouteRequest::new().param("page", "9"))
        .await;
    println!("   └─ page 9 (never cached): {} {}", response.status, response.body);
    db_up.store(true, Ordering::SeqCst);

    let response = orchestrator.handle("/api/profile", RouteRequest::new()).await;
    println!("   └─ /api/profile (uncached): {} {}", response.status, response.body);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Queued payments
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n💳 Submitting 5 payments...");
    let mut outcomes = orchestrator.subscribe_outcomes();
    for i in 1..=5 {
        let request = RouteRequest::new()
            .task_id(format!("pay-{i}"))
            .body(json!({"userId": format!("user-{i}"), "amount": i * 1000}));
        let response = orchestrator.handle("/api/payments", request).await;
        println!("   └─ {} {}", response.status, response.body["taskId"]);
    }
    println!("   └─ Queue: {:?}", orchestrator.queue().stats());
    for _ in 0..5 {
        let outcome = outcomes.recv().await?;
        println!("   └─ ✅ {} {} after {} attempt(s)", outcome.task_id, outcome.status, outcome.attempts);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Analytics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Tracking 4 analytics events...");
    for name in ["page_view", "click", "scroll", "page_view"] {
        orchestrator.track(AnalyticsEvent::new(name, Value::Null));
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Status and metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🩺 Load status:");
    let status = serde_json::to_string_pretty(&orchestrator.status())?;
    for line in status.lines() {
        println!("   {line}");
    }

    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    orchestrator.shutdown().await;
    println!("   ✅ Shutdown complete!");

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let max = samples.iter().map(|v| v.into_inner()).fold(0.0, f64::max);
                histograms.push((name, label_str, count, sum, max));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    gauges.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    histograms.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms (seconds)");
        for (name, labels, count, sum, max) in &histograms {
            let avg = if *count > 0 { sum / *count as f64 } else { 0.0 };
            println!("   │  └─ {}{} count={} avg={:.4} max={:.4}", name, labels, count, avg, max);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
