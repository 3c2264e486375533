// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the load-control layer.
//!
//! # Example
//!
//! ```
//! use load_control::LoadControlConfig;
//!
//! // Reference tuning
//! let config = LoadControlConfig::default();
//! assert_eq!(config.queue_max_concurrent, 20);
//! assert_eq!(config.payments.failure_count, 3);
//!
//! // Partial JSON document, everything else defaulted
//! let config = LoadControlConfig::from_json_str(r#"{
//!     "queue_max_concurrent": 5,
//!     "analytics_flush_interval_ms": 1000
//! }"#).unwrap();
//! assert_eq!(config.queue_max_concurrent, 5);
//! assert_eq!(config.analytics_max_batch_size, 100);
//! ```

use serde::Deserialize;
use std::time::Duration;

use crate::batching::BatchConfig;
use crate::cache::{DEFAULT_REGIONS, DEFAULT_STALE_FRACTION};
use crate::queue::QueueConfig;
use crate::resilience::{BackoffConfig, BreakerConfig, OperationClass, RetryPolicy};

/// Configuration for the load-control layer.
///
/// All fields have defaults matching the reference deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadControlConfig {
    /// Breaker for ordinary data reads
    #[serde(default = "BreakerConfig::fast_path")]
    pub fast_path: BreakerConfig,
    /// Breaker for payment submissions
    #[serde(default = "BreakerConfig::payments")]
    pub payments: BreakerConfig,
    /// Breaker for analytics submissions
    #[serde(default = "BreakerConfig::analytics")]
    pub analytics: BreakerConfig,

    /// Worker slots of the payment queue
    #[serde(default = "default_queue_max_concurrent")]
    pub queue_max_concurrent: usize,
    /// Re-admissions after failure before a task is marked failed
    #[serde(default = "default_queue_max_retries")]
    pub queue_max_retries: u32,
    /// Delay before re-admission. `None` re-appends immediately.
    #[serde(default)]
    pub queue_retry_backoff: Option<BackoffConfig>,

    /// Analytics batch settings
    #[serde(default = "default_analytics_max_batch_size")]
    pub analytics_max_batch_size: usize,
    #[serde(default = "default_analytics_flush_interval_ms")]
    pub analytics_flush_interval_ms: u64,

    /// Fraction of the TTL after which cached entries read as stale
    #[serde(default = "default_stale_fraction")]
    pub stale_fraction: f64,
    /// `max-age` sent with a last-known value served after a failure
    #[serde(default = "default_stale_fallback_max_age_secs")]
    pub stale_fallback_max_age_secs: u64,
    /// Named cache regions
    #[serde(default = "default_cache_regions")]
    pub cache_regions: Vec<String>,
}

fn default_queue_max_concurrent() -> usize { 20 }
fn default_queue_max_retries() -> u32 { 3 }
fn default_analytics_max_batch_size() -> usize { 100 }
fn default_analytics_flush_interval_ms() -> u64 { 5_000 }
fn default_stale_fraction() -> f64 { DEFAULT_STALE_FRACTION }
fn default_stale_fallback_max_age_secs() -> u64 { 10 }
fn default_cache_regions() -> Vec<String> {
    DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect()
}

impl Default for LoadControlConfig {
    fn default() -> Self {
        Self {
            fast_path: BreakerConfig::fast_path(),
            payments: BreakerConfig::payments(),
            analytics: BreakerConfig::analytics(),
            queue_max_concurrent: default_queue_max_concurrent(),
            queue_max_retries: default_queue_max_retries(),
            queue_retry_backoff: None,
            analytics_max_batch_size: default_analytics_max_batch_size(),
            analytics_flush_interval_ms: default_analytics_flush_interval_ms(),
            stale_fraction: default_stale_fraction(),
            stale_fallback_max_age_secs: default_stale_fallback_max_age_secs(),
            cache_regions: default_cache_regions(),
        }
    }
}

impl LoadControlConfig {
    /// Parse a JSON document. Unknown fields are rejected.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn breaker(&self, class: OperationClass) -> &BreakerConfig {
        match class {
            OperationClass::FastPath => &self.fast_path,
            OperationClass::Payments => &self.payments,
            OperationClass::Analytics => &self.analytics,
        }
    }

    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        let retry = match &self.queue_retry_backoff {
            Some(backoff) => RetryPolicy::with_backoff(self.queue_max_retries, backoff.clone()),
            None => RetryPolicy::flat(self.queue_max_retries),
        };
        QueueConfig {
            max_concurrent: self.queue_max_concurrent,
            retry,
        }
    }

    #[must_use]
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_batch_size: self.analytics_max_batch_size,
            flush_interval_ms: self.analytics_flush_interval_ms,
        }
    }

    #[must_use]
    pub fn stale_fallback_max_age(&self) -> Duration {
        Duration::from_secs(self.stale_fallback_max_age_secs)
    }
}
