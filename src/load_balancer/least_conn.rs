//! Least Connections load balancing strategy.

use std::sync::Arc;
use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Least connections selector.
/// Selects the backend with the minimum number of in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        // Each counter is read on its own; the minimum is a best-effort snapshot.
        // min_by_key keeps the first of equal keys, so construction order breaks ties.
        backends
            .iter()
            .min_by_key(|b| b.in_flight())
            .cloned()
    }
}
