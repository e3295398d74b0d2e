//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → pool.rs (registry of backends, fixed at startup)
//!     → least_conn.rs (pick backend with fewest in-flight requests)
//!     → backend.rs (reserve a slot, released by guard drop)
//!     → Return guard or None when the registry is empty
//! ```
//!
//! # Design Decisions
//! - Selection is stateless; each backend owns its own counter
//! - No registry-wide lock: select-then-reserve is racy and that is accepted
//! - Membership never changes after construction

use std::fmt::Debug;
use std::sync::Arc;

pub mod backend;
pub mod least_conn;
pub mod pool;

pub use backend::{Backend, BackendGuard};
pub use least_conn::LeastConnections;
pub use pool::{BackendRegistry, RegistryError};

/// A backend selection policy.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Choose a backend, or `None` if there is nothing to choose from.
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}
