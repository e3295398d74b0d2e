//! Request dispatch.
//!
//! # Responsibilities
//! - Select the least loaded backend and reserve a slot on it
//! - Issue a single GET to `<backend><path>` (no retries, no failover)
//! - Report the backend status with a body naming the backend
//! - Keep the reservation until the response body is done
//!
//! Life cycle: selected → reserved → called → responded → released.
//! The reservation is a [`BackendGuard`], so every exit path releases,
//! including errors, panics and a dropped (cancelled) handler future.

use axum::{
    body::Body,
    http::{header, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::TimeoutConfig;
use crate::http::response::GuardedBody;
use crate::load_balancer::{Backend, BackendGuard, BackendRegistry};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Per-request failure conditions.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no backend available")]
    NoBackendAvailable,
    #[error("backend {address} unreachable: {source}")]
    BackendUnreachable {
        address: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to write response from {address}")]
    ResponseWriteFailed { address: String },
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NoBackendAvailable => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::BackendUnreachable { .. } | DispatchError::ResponseWriteFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Address of the backend involved, if one was chosen.
    pub fn backend(&self) -> Option<&str> {
        match self {
            DispatchError::NoBackendAvailable => None,
            DispatchError::BackendUnreachable { address, .. }
            | DispatchError::ResponseWriteFailed { address } => Some(address),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let message = match &self {
            DispatchError::NoBackendAvailable => "No available servers",
            DispatchError::BackendUnreachable { .. } => "Backend server error",
            DispatchError::ResponseWriteFailed { .. } => "Failed to write response",
        };
        (self.status(), message).into_response()
    }
}

/// A backend answered; the reservation is still held.
#[derive(Debug)]
pub struct Dispatched {
    status: StatusCode,
    guard: BackendGuard,
}

impl Dispatched {
    /// Status code returned by the backend.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn backend(&self) -> &Arc<Backend> {
        self.guard.backend()
    }

    /// Synthetic payload sent to the caller.
    pub fn body_text(&self) -> String {
        format!("Response from {}", self.guard.address())
    }

    /// Response without a payload (HEAD). Headers match the GET response.
    pub fn into_head_response(self) -> Response {
        let len = self.body_text().len().to_string();
        (
            self.status,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (header::CONTENT_LENGTH, len),
            ],
            Body::new(GuardedBody::empty(self.guard)),
        )
            .into_response()
    }
}

impl IntoResponse for Dispatched {
    fn into_response(self) -> Response {
        let text = self.body_text();
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::new(GuardedBody::new(text, self.guard)),
        )
            .into_response()
    }
}

/// Dispatches requests to the registry's backends.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<BackendRegistry>,
    client: Client<HttpConnector, Body>,
    upstream_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<BackendRegistry>, timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        // No idle connections kept: every call opens a fresh one.
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(connector);

        Self {
            registry,
            client,
            upstream_timeout: Duration::from_secs(timeouts.upstream_secs),
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Run select, reserve and call for one inbound path.
    pub async fn dispatch(&self, path: &str) -> Result<Dispatched, DispatchError> {
        let backend = self
            .registry
            .select_least_loaded()
            .ok_or(DispatchError::NoBackendAvailable)?;

        let guard = self.registry.reserve(&backend);
        let target = guard.target_for(path);
        tracing::debug!(backend = %guard.address(), target = %target, in_flight = guard.in_flight(), "Backend selected");

        // On error the guard drops here and the slot is released.
        let status = self
            .call(&target)
            .await
            .map_err(|source| DispatchError::BackendUnreachable {
                address: guard.address().to_string(),
                source,
            })?;

        Ok(Dispatched { status, guard })
    }

    /// Single GET, bounded by the upstream deadline. The body is not read.
    async fn call(&self, target: &str) -> Result<StatusCode, BoxError> {
        let uri: Uri = target.parse()?;
        let request = Request::get(uri).body(Body::empty())?;

        let response = tokio::time::timeout(self.upstream_timeout, self.client.request(request)).await??;
        Ok(response.status())
    }
}
