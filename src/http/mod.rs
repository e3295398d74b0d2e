//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → proxy.rs (select, reserve, call backend)
//!     → response.rs (body that releases the reservation when written)
//!     → Send to client
//! ```

pub mod proxy;
pub mod response;
pub mod server;

pub use proxy::{DispatchError, Dispatched, Dispatcher};
pub use server::HttpServer;
