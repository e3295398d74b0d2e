//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the dispatch handler on every path and method
//! - Wire up middleware (tracing, request ID, request timeout)
//! - Serve on a bound listener until shutdown, draining in-flight requests

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Method, Request, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::LbConfig;
use crate::http::proxy::{DispatchError, Dispatcher};
use crate::load_balancer::BackendRegistry;
use crate::observability::metrics;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// HTTP front end of the load balancer.
pub struct HttpServer {
    router: Router,
    dispatcher: Dispatcher,
}

impl HttpServer {
    /// Create a new HTTP server over an already built registry.
    pub fn new(config: &LbConfig, registry: Arc<BackendRegistry>) -> Self {
        let dispatcher = Dispatcher::new(registry, &config.timeouts);
        let router = Self::build_router(config, dispatcher.clone());
        Self { router, dispatcher }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &LbConfig, dispatcher: Dispatcher) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(dispatcher)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(&X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id
                )
            }))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.dispatcher.registry().len(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Dispatch one inbound request. Only the path is forwarded.
async fn proxy_handler(State(dispatcher): State<Dispatcher>, method: Method, uri: Uri) -> Response {
    let start_time = Instant::now();
    let path = uri.path();

    tracing::debug!(method = %method, path = %path, "Dispatching request");

    match dispatcher.dispatch(path).await {
        Ok(dispatched) => {
            let status = dispatched.status();
            let backend = dispatched.backend().address().to_string();
            tracing::debug!(backend = %backend, status = %status, "Backend responded");
            metrics::record_request(method.as_str(), status.as_u16(), &backend, start_time);

            if method == Method::HEAD {
                dispatched.into_head_response()
            } else {
                dispatched.into_response()
            }
        }
        Err(e) => {
            match &e {
                DispatchError::NoBackendAvailable => {
                    tracing::warn!(path = %path, "No backend available");
                }
                _ => tracing::error!(path = %path, error = %e, "Dispatch failed"),
            }
            metrics::record_request(method.as_str(), e.status().as_u16(), e.backend().unwrap_or("none"), start_time);
            e.into_response()
        }
    }
}
