// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-route load policy and the route table.
//!
//! # Example
//!
//! ```
//! use load_control::orchestrator::{CachePolicy, RoutePolicy};
//!
//! let events = RoutePolicy::cached(CachePolicy::new("events", 60).revalidate(30).stale_while_revalidate());
//! assert_eq!(
//!     events.cache.as_ref().unwrap().cache_control(),
//!     "public, max-age=60, s-maxage=30, stale-while-revalidate"
//! );
//!
//! let payments = RoutePolicy::queued();
//! assert!(payments.queue && payments.no_cache);
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::types::{Params, RouteHandler, RouteRequest};
use crate::resilience::OperationClass;

/// Caching rules for a read route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Cache region holding this route's entries
    pub region: String,
    pub ttl_secs: u64,
    /// Shared-cache window advertised as `s-maxage`
    pub revalidate_secs: Option<u64>,
    /// Advertise `stale-while-revalidate` to downstream caches
    pub stale_while_revalidate: bool,
}

impl CachePolicy {
    pub fn new(region: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            region: region.into(),
            ttl_secs,
            revalidate_secs: None,
            stale_while_revalidate: false,
        }
    }

    #[must_use]
    pub fn revalidate(mut self, secs: u64) -> Self {
        self.revalidate_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn stale_while_revalidate(mut self) -> Self {
        self.stale_while_revalidate = true;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// `Cache-Control` value for responses served under this policy
    #[must_use]
    pub fn cache_control(&self) -> String {
        let mut header = format!("public, max-age={}", self.ttl_secs);
        if let Some(revalidate) = self.revalidate_secs {
            header.push_str(&format!(", s-maxage={revalidate}"));
        }
        if self.stale_while_revalidate {
            header.push_str(", stale-while-revalidate");
        }
        header
    }
}

/// Load policy for one logical route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    pub cache: Option<CachePolicy>,
    /// Never cache. Auth, payments, profile mutations, attendance scans.
    pub no_cache: bool,
    /// Hand the request to the soft queue instead of running it inline
    pub queue: bool,
    /// Which breaker guards the handler
    pub class: OperationClass,
}

impl RoutePolicy {
    /// Read route served through the cache
    pub fn cached(cache: CachePolicy) -> Self {
        Self {
            cache: Some(cache),
            no_cache: false,
            queue: false,
            class: OperationClass::FastPath,
        }
    }

    /// Read route that always reaches the handler
    pub fn no_cache() -> Self {
        Self {
            cache: None,
            no_cache: true,
            queue: false,
            class: OperationClass::FastPath,
        }
    }

    /// Write route accepted into the payment queue
    pub fn queued() -> Self {
        Self {
            cache: None,
            no_cache: true,
            queue: true,
            class: OperationClass::Payments,
        }
    }

    #[must_use]
    pub fn class(mut self, class: OperationClass) -> Self {
        self.class = class;
        self
    }

    /// The cache policy, unless the route opted out
    #[must_use]
    pub fn effective_cache(&self) -> Option<&CachePolicy> {
        if self.no_cache || self.queue {
            return None;
        }
        self.cache.as_ref()
    }
}

/// Canonical cache key: route followed by its parameters in key order.
///
/// Names and values are percent-encoded, so a value holding `&` or `=`
/// cannot pose as a second parameter.
///
/// ```
/// use load_control::orchestrator::{cache_key, Params};
///
/// let mut params = Params::new();
/// params.insert("page".into(), "2".into());
/// params.insert("category".into(), "music".into());
/// assert_eq!(cache_key("/api/events", &params), "/api/events?category=music&page=2");
/// assert_eq!(cache_key("/api/events", &Params::new()), "/api/events");
///
/// params.insert("q".into(), "rock&roll".into());
/// assert_eq!(cache_key("/api/events", &params), "/api/events?category=music&page=2&q=rock%26roll");
/// ```
#[must_use]
pub fn cache_key(route: &str, params: &Params) -> String {
    if params.is_empty() {
        return route.to_string();
    }
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    format!("{route}?{}", query.join("&"))
}

/// Identity of a read for coalescing and caching: the [`cache_key`] plus the
/// compact JSON body, when there is one.
///
/// Object members serialize in key order, so equal bodies give equal keys.
/// A request without a body keys exactly as its [`cache_key`].
///
/// ```
/// use load_control::orchestrator::{request_key, RouteRequest};
/// use serde_json::json;
///
/// let plain = RouteRequest::new().param("page", "1");
/// assert_eq!(request_key("/api/search", &plain), "/api/search?page=1");
///
/// let with_body = plain.body(json!({"user": "alice"}));
/// assert_eq!(request_key("/api/search", &with_body), r#"/api/search?page=1#body={"user":"alice"}"#);
/// ```
#[must_use]
pub fn request_key(route: &str, request: &RouteRequest) -> String {
    let key = cache_key(route, &request.params);
    match &request.body {
        Some(body) => format!("{key}#body={body}"),
        None => key,
    }
}

#[derive(Clone)]
pub(crate) struct Route {
    pub policy: RoutePolicy,
    pub handler: Arc<dyn RouteHandler>,
}

/// Registered routes, shared with queue workers.
#[derive(Default)]
pub(crate) struct RouteTable {
    routes: RwLock<HashMap<String, Route>>,
}

impl RouteTable {
    pub fn insert(&self, path: String, route: Route) -> bool {
        self.routes.write().insert(path, route).is_some()
    }

    pub fn get(&self, path: &str) -> Option<Route> {
        self.routes.read().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_control_variants() {
        assert_eq!(CachePolicy::new("events", 300).cache_control(), "public, max-age=300");
        assert_eq!(
            CachePolicy::new("events", 300).revalidate(60).cache_control(),
            "public, max-age=300, s-maxage=60"
        );
        assert_eq!(
            CachePolicy::new("events", 300).stale_while_revalidate().cache_control(),
            "public, max-age=300, stale-while-revalidate"
        );
    }

    #[test]
    fn test_no_cache_overrides_cache_policy() {
        let mut policy = RoutePolicy::cached(CachePolicy::new("events", 60));
        assert!(policy.effective_cache().is_some());

        policy.no_cache = true;
        assert!(policy.effective_cache().is_none());
    }

    #[test]
    fn test_cache_key_ignores_insertion_order() {
        let mut a = Params::new();
        a.insert("b".into(), "2".into());
        a.insert("a".into(), "1".into());
        let mut b = Params::new();
        b.insert("a".into(), "1".into());
        b.insert("b".into(), "2".into());

        assert_eq!(cache_key("/r", &a), cache_key("/r", &b));
    }

    #[test]
    fn test_cache_key_escapes_separators() {
        let mut smuggled = Params::new();
        smuggled.insert("a".into(), "1&b=2".into());
        let mut split = Params::new();
        split.insert("a".into(), "1".into());
        split.insert("b".into(), "2".into());

        assert_ne!(cache_key("/r", &smuggled), cache_key("/r", &split));
        assert_eq!(cache_key("/r", &smuggled), "/r?a=1%26b%3D2");

        let mut odd_name = Params::new();
        odd_name.insert("a=1&b".into(), "2".into());
        assert_eq!(cache_key("/r", &odd_name), "/r?a%3D1%26b=2");
    }

    #[test]
    fn test_request_key_includes_body() {
        use serde_json::json;

        let alice = RouteRequest::new().body(json!({"user": "alice"}));
        let bob = RouteRequest::new().body(json!({"user": "bob"}));
        assert_ne!(request_key("/login", &alice), request_key("/login", &bob));
        assert_ne!(request_key("/login", &alice), request_key("/login", &RouteRequest::new()));

        // Member order does not matter
        let ab = RouteRequest::new().body(json!({"a": 1, "b": 2}));
        let ba: serde_json::Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        assert_eq!(request_key("/r", &ab), request_key("/r", &RouteRequest::new().body(ba)));

        // Bodyless reads key like their cache key
        let plain = RouteRequest::new().param("page", "1");
        assert_eq!(request_key("/r", &plain), cache_key("/r", &plain.params));
    }

    #[test]
    fn test_default_classes() {
        assert_eq!(RoutePolicy::queued().class, OperationClass::Payments);
        assert_eq!(RoutePolicy::no_cache().class, OperationClass::FastPath);
        assert_eq!(
            RoutePolicy::no_cache().class(OperationClass::Analytics).class,
            OperationClass::Analytics
        );
    }
}
