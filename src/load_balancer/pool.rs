//! Backend registry.
//!
//! # Responsibilities
//! - Parse the configured addresses into backends, all or nothing
//! - Apply the load balancing policy to select a backend
//! - Provide reservation guards for in-flight tracking

use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::load_balancer::{
    LoadBalancer,
    backend::{Backend, BackendGuard},
    least_conn::LeastConnections,
};

/// Error type for registry construction.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid backend address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Owns the fixed, ordered set of backends.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
    balancer: Box<dyn LoadBalancer>,
}

impl BackendRegistry {
    /// Build a registry from backend addresses, using least connections.
    pub fn new<I, S>(addresses: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let backends = addresses
            .into_iter()
            .map(|a| parse_address(a.as_ref()).map(|url| Arc::new(Backend::new(url))))
            .collect::<Result<Vec<_>, _>>()?;

        for b in &backends {
            tracing::debug!(backend = %b, "Backend registered");
        }

        Ok(Self {
            backends,
            balancer: Box::new(LeastConnections::new()),
        })
    }

    /// The backend with the fewest in-flight requests, earliest on ties.
    pub fn select_least_loaded(&self) -> Option<Arc<Backend>> {
        self.balancer.next_server(&self.backends)
    }

    /// Take one in-flight slot on `backend`.
    pub fn reserve(&self, backend: &Arc<Backend>) -> BackendGuard {
        BackendGuard::acquire(backend.clone())
    }

    /// Give a slot back. Dropping the guard has the same effect.
    pub fn release(&self, guard: BackendGuard) {
        drop(guard);
    }

    /// All backends in construction order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Parse one configured address. A bare `host:port` means plain HTTP.
fn parse_address(raw: &str) -> Result<Url, RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidAddress {
        address: raw.to_string(),
        reason,
    };

    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed".to_string()));
    }
    Ok(url)
}
