//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake material)
//!     → connection.rs (in-flight accounting, load shedding)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional; without it the edge serves plain HTTP
//! - Over-limit requests fail fast with 503

pub mod connection;
pub mod tls;

pub use connection::{InFlightGuard, InFlightTracker};
pub use tls::{load_tls_config, TlsError};
