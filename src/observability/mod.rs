//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Edge proxy and compile backend produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (fmt subscriber, filtered by RUST_LOG or config)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID is a span field on every request
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
