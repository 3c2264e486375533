// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP surface using axum.
//!
//! [`router`] serves every registered route through the orchestrator plus the
//! status endpoint. [`status_router`] serves only the status endpoint, for
//! services that mount their own routes and call
//! [`LoadOrchestrator::handle`] themselves.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::debug;

use super::types::{Params, RouteRequest, RouteResponse};
use super::LoadOrchestrator;
use crate::error::LoadError;

/// Path of the load status endpoint
pub const STATUS_PATH: &str = "/__load/status";

/// Marks responses served from cache
pub const X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");

/// Optional caller-supplied correlation id for queued submissions
pub const X_TASK_ID: HeaderName = HeaderName::from_static("x-task-id");

impl IntoResponse for RouteResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        let headers = response.headers_mut();
        if let Some(cache_control) = self.cache_control {
            if let Ok(value) = HeaderValue::from_str(&cache_control) {
                headers.insert(header::CACHE_CONTROL, value);
            }
        }
        if let Some(status) = self.cache_status {
            headers.insert(X_CACHE_STATUS, HeaderValue::from_static(status.as_str()));
        }
        response
    }
}

impl IntoResponse for LoadError {
    fn into_response(self) -> Response {
        RouteResponse::error(&self).into_response()
    }
}

/// Router serving all registered routes and the status endpoint.
pub fn router(orchestrator: Arc<LoadOrchestrator>) -> Router {
    Router::new()
        .route(STATUS_PATH, get(load_status))
        .fallback(dispatch)
        .with_state(orchestrator)
}

/// Router serving only `GET /__load/status`.
pub fn status_router(orchestrator: Arc<LoadOrchestrator>) -> Router {
    Router::new()
        .route(STATUS_PATH, get(load_status))
        .with_state(orchestrator)
}

async fn load_status(State(orchestrator): State<Arc<LoadOrchestrator>>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(orchestrator.status()),
    )
}

async fn dispatch(
    State(orchestrator): State<Arc<LoadOrchestrator>>,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<Params>,
    body: Bytes,
) -> Response {
    let body = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(route = %uri.path(), error = %e, "Rejected malformed body");
                return LoadError::InvalidBody(e.to_string()).into_response();
            }
        }
    };
    let task_id = headers
        .get(&X_TASK_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request = RouteRequest {
        params,
        body,
        task_id,
    };
    orchestrator.handle(uri.path(), request).await.into_response()
}
