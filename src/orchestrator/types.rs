// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request and response types for the orchestrator.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;

use crate::error::{HandlerError, LoadError};
use crate::queue::EnqueueAck;

/// Query or path parameters, ordered so cache keys are canonical.
pub type Params = BTreeMap<String, String>;

/// A parsed request handed to a route handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteRequest {
    pub params: Params,
    pub body: Option<Value>,
    /// Correlation id for queued submissions. Generated when absent.
    pub task_id: Option<String>,
}

impl RouteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }
}

/// Payload of a queued write: the route to run and its request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRequest {
    pub route: String,
    pub request: RouteRequest,
}

/// The business logic behind a route. Opaque to the orchestrator: it may
/// succeed, fail or run slowly.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: RouteRequest) -> Result<Value, HandlerError>;
}

#[async_trait]
impl<F, Fut> RouteHandler for F
where
    F: Fn(RouteRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn handle(&self, request: RouteRequest) -> Result<Value, HandlerError> {
        (self)(request).await
    }
}

/// How the response relates to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served fresh from cache
    Hit,
    /// Served from cache past its fresh window, or as a last-known
    /// fallback after a failure
    Stale,
    /// Fetched from the handler
    Miss,
}

impl CacheStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Stale => "stale",
            Self::Miss => "miss",
        }
    }
}

/// Outcome of a routed request, carrying its HTTP semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: StatusCode,
    pub body: Value,
    /// `Cache-Control` header value
    pub cache_control: Option<String>,
    /// `X-Cache-Status` header value. `None` for uncached routes.
    pub cache_status: Option<CacheStatus>,
    /// Whether the body is a last-known value served after a failure
    pub fallback: bool,
}

impl RouteResponse {
    /// Uncached success
    pub(crate) fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            cache_control: Some("no-store".to_string()),
            cache_status: None,
            fallback: false,
        }
    }

    pub(crate) fn cached(body: Value, status: CacheStatus, cache_control: String) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            cache_control: Some(cache_control),
            cache_status: Some(status),
            fallback: false,
        }
    }

    pub(crate) fn stale_fallback(body: Value, max_age_secs: u64) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            cache_control: Some(format!("public, max-age={max_age_secs}")),
            cache_status: Some(CacheStatus::Stale),
            fallback: true,
        }
    }

    pub(crate) fn accepted(ack: EnqueueAck) -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            body: json!({
                "taskId": ack.task_id,
                "status": ack.status,
                "message": "Request accepted and queued for processing",
            }),
            cache_control: Some("no-store".to_string()),
            cache_status: None,
            fallback: false,
        }
    }

    pub(crate) fn error(err: &LoadError) -> Self {
        Self {
            status: err.status(),
            body: err.body(),
            cache_control: Some("no-store".to_string()),
            cache_status: None,
            fallback: false,
        }
    }
}
