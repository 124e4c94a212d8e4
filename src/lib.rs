//! Vyper compilation service with a TLS-terminating edge proxy.

pub mod backend;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use backend::BackendServer;
pub use config::schema::ServerConfig;
pub use http::EdgeServer;
pub use lifecycle::Shutdown;
