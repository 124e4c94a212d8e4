//! Mapping upstream failures to client responses.
//!
//! - Connection or protocol failure → 502 Bad Gateway
//! - No response headers within the upstream timeout → 504 Gateway Timeout
//! - Streamed request body over the size limit → 413 Payload Too Large

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Failure while relaying a request to the upstream.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream request failed: {0}")]
    Unreachable(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("could not build upstream request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    #[error("request body exceeded the size limit")]
    PayloadTooLarge,
}

impl ForwardError {
    /// Status code returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ForwardError::Unreachable(_) | ForwardError::InvalidRequest(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Unreachable(_) => "unreachable",
            ForwardError::InvalidRequest(_) => "invalid_request",
            ForwardError::PayloadTooLarge => "payload_too_large",
        }
    }

    /// Whether the upstream, rather than the client, is at fault.
    pub fn is_upstream_fault(&self) -> bool {
        !matches!(self, ForwardError::PayloadTooLarge)
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let body = match self {
            ForwardError::Timeout(_) => "Upstream timed out",
            ForwardError::PayloadTooLarge => "Request body too large",
            _ => "Upstream request failed",
        };
        (self.status(), body).into_response()
    }
}
