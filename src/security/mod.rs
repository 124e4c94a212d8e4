//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarded request:
//!     → headers.rs (strip hop-by-hop, set X-Forwarded-*)
//!     → Pass to upstream client
//! ```
//!
//! # Design Decisions
//! - No trust in client input: forwarding headers are always overwritten,
//!   except the `X-Forwarded-For` chain, which is extended

pub mod headers;
