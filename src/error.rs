// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Errors surfaced by the orchestrator.
//!
//! Every [`LoadError`] maps to an HTTP status and a stable machine code. The
//! JSON body never carries the underlying failure text; that goes to the log.

use axum::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

use crate::queue::QueueError;
use crate::resilience::CircuitError;

/// Opaque failure of a wrapped handler.
///
/// Cloneable so one outcome can be handed to every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Breaker refused and no fallback value exists
    #[error("service overloaded")]
    ServiceOverloaded,

    #[error("no route registered for '{0}'")]
    UnknownRoute(String),

    #[error("unknown cache region '{0}'")]
    UnknownRegion(String),

    #[error("task queue is closed")]
    QueueClosed,

    #[error("task '{0}' is already queued")]
    DuplicateTask(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Handler failed and no fallback value exists
    #[error("handler failed: {0}")]
    Handler(#[source] HandlerError),
}

impl LoadError {
    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ServiceOverloaded | Self::Handler(_) => "SERVICE_OVERLOADED",
            Self::UnknownRoute(_) => "UNKNOWN_ROUTE",
            Self::UnknownRegion(_) => "UNKNOWN_REGION",
            Self::QueueClosed => "QUEUE_CLOSED",
            Self::DuplicateTask(_) => "DUPLICATE_TASK",
            Self::InvalidBody(_) => "INVALID_BODY",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ServiceOverloaded | Self::Handler(_) | Self::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnknownRoute(_) => StatusCode::NOT_FOUND,
            Self::UnknownRegion(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::DuplicateTask(_) => StatusCode::CONFLICT,
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// `{error, code, message}` response body
    #[must_use]
    pub fn body(&self) -> Value {
        let (error, message) = match self {
            Self::ServiceOverloaded | Self::Handler(_) => (
                "Service temporarily unavailable",
                "The service is under heavy load. Please retry in a few seconds.".to_string(),
            ),
            Self::QueueClosed => (
                "Service temporarily unavailable",
                "New submissions are not being accepted. Please retry shortly.".to_string(),
            ),
            Self::UnknownRoute(route) => ("Not found", format!("No route registered for '{route}'.")),
            Self::UnknownRegion(_) => ("Internal error", "Route is misconfigured.".to_string()),
            Self::DuplicateTask(id) => ("Conflict", format!("Task '{id}' is already queued.")),
            Self::InvalidBody(_) => ("Bad request", "Request body must be valid JSON.".to_string()),
        };
        json!({
            "error": error,
            "code": self.code(),
            "message": message,
        })
    }
}

impl From<QueueError> for LoadError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Closed => Self::QueueClosed,
            QueueError::DuplicateTask(id) => Self::DuplicateTask(id),
        }
    }
}

impl From<CircuitError<HandlerError>> for LoadError {
    fn from(err: CircuitError<HandlerError>) -> Self {
        match err {
            CircuitError::Rejected => Self::ServiceOverloaded,
            CircuitError::Inner(e) => Self::Handler(e),
        }
    }
}
