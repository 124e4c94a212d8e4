//! Configuration validation.
//!
//! Serde handles syntax; this module checks what serde cannot: addresses
//! parse, the upstream is a plain-HTTP URL, CORS values are legal header
//! content, and limits are non-zero. Every problem is reported, not just the
//! first one.

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue, Method};
use url::Url;

use crate::config::schema::{BackendConfig, EdgeConfig, ServerConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `edge.upstream`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the whole configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    validate_edge(&config.edge, &mut errors);
    validate_backend(&config.backend, &mut errors);

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_edge(edge: &EdgeConfig, errors: &mut Vec<ValidationError>) {
    if edge.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("edge.bind_address", "not a socket address"));
    }

    match Url::parse(&edge.upstream) {
        Ok(url) if url.scheme() != "http" => {
            errors.push(ValidationError::new(
                "edge.upstream",
                format!("scheme '{}' not supported, expected 'http'", url.scheme()),
            ));
        }
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::new("edge.upstream", "missing host"));
        }
        Ok(url) if url.path() != "/" || url.query().is_some() => {
            errors.push(ValidationError::new(
                "edge.upstream",
                format!("must not carry a path or query, got '{}'", url.path()),
            ));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("edge.upstream", e.to_string())),
    }

    if let Some(proto) = &edge.forwarded_proto {
        if proto != "http" && proto != "https" {
            errors.push(ValidationError::new(
                "edge.forwarded_proto",
                "expected 'http' or 'https'",
            ));
        }
    }

    if edge.max_connections == 0 {
        errors.push(ValidationError::new("edge.max_connections", "must be > 0"));
    }
    if edge.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("edge.timeouts.upstream_secs", "must be > 0"));
    }
    if edge.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("edge.timeouts.connect_secs", "must be > 0"));
    }

    if HeaderValue::from_str(&edge.cors.allow_origin).is_err() {
        errors.push(ValidationError::new(
            "edge.cors.allow_origin",
            "not a valid header value",
        ));
    }
    for method in &edge.cors.allow_methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "edge.cors.allow_methods",
                format!("invalid method '{}'", method),
            ));
        }
    }
    for header in &edge.cors.allow_headers {
        if HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "edge.cors.allow_headers",
                format!("invalid header name '{}'", header),
            ));
        }
    }
}

fn validate_backend(backend: &BackendConfig, errors: &mut Vec<ValidationError>) {
    if backend.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("backend.bind_address", "not a socket address"));
    }
    if backend.compiler.program.trim().is_empty() {
        errors.push(ValidationError::new("backend.compiler.program", "must not be empty"));
    }
    if backend.compiler.max_concurrent == 0 {
        errors.push(ValidationError::new("backend.compiler.max_concurrent", "must be > 0"));
    }
    if backend.compiler.timeout_secs == 0 {
        errors.push(ValidationError::new("backend.compiler.timeout_secs", "must be > 0"));
    }
}
