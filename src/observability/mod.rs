//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registry and dispatcher produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through logs via tower-http
//! - Metric calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
