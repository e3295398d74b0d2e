//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server by its normalized base address
//! - Track in-flight requests (for Least Connections LB)
//! - Hand out RAII reservations that always release their slot

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

use crate::observability::metrics;

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Base URL serialized without a trailing slash.
    address: String,
    /// Number of requests currently between reserve and release.
    in_flight: AtomicUsize,
}

impl Backend {
    /// Create a backend from an already validated base URL.
    pub fn new(base_url: Url) -> Self {
        let address = base_url.as_str().trim_end_matches('/').to_string();
        Self {
            address,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Normalized address, used both as identifier and as target prefix.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Snapshot of the in-flight counter.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Outbound target for an inbound request path.
    pub fn target_for(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub(crate) fn inc_in_flight(&self) -> usize {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::in_flight_reserved(&self.address);
        now
    }

    /// Decrement, refusing to go below zero.
    pub(crate) fn dec_in_flight(&self) -> usize {
        match self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => {
                metrics::in_flight_released(&self.address);
                prev - 1
            }
            Err(_) => {
                tracing::error!(backend = %self.address, "In-flight counter release at zero refused");
                0
            }
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// A RAII guard holding one reserved slot on a backend.
///
/// Created only by [`BackendRegistry::reserve`](crate::load_balancer::pool::BackendRegistry::reserve);
/// the slot is released exactly once, when the guard drops.
#[derive(Debug)]
pub struct BackendGuard {
    backend: Arc<Backend>,
}

impl BackendGuard {
    pub(crate) fn acquire(backend: Arc<Backend>) -> Self {
        let in_flight = backend.inc_in_flight();
        tracing::trace!(backend = %backend.address, in_flight, "Reserved");
        Self { backend }
    }

    /// The backend this reservation is held on.
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Deref for BackendGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendGuard {
    fn drop(&mut self) {
        let in_flight = self.backend.dec_in_flight();
        tracing::trace!(backend = %self.backend.address, in_flight, "Released");
    }
}
