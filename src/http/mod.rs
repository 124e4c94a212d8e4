//! Edge HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, span)
//!     → cors.rs (OPTIONS answered here, never forwarded)
//!     → upstream.rs (rewrite URI + forwarding headers, relay)
//!     → response.rs (upstream failures → 502/504)
//!     → Send to client
//! ```

pub mod cors;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use cors::CorsPolicy;
pub use request::X_REQUEST_ID;
pub use response::ForwardError;
pub use server::{EdgeServer, EdgeSettings, EdgeState, ServeError, SettingsError};
pub use upstream::{Upstream, UpstreamClient};
