//! CORS preflight short-circuit.
//!
//! Every `OPTIONS` request is answered at the edge, whatever its path,
//! headers or body. The backend never sees a preflight.

use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
};

use crate::config::CorsConfig;

/// Invalid value in the `[edge.cors]` section.
#[derive(Debug, thiserror::Error)]
#[error("invalid CORS value for {field}: {value:?}")]
pub struct CorsPolicyError {
    pub field: &'static str,
    pub value: String,
}

/// Pre-rendered preflight headers.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
}

fn header_value(field: &'static str, value: String) -> Result<HeaderValue, CorsPolicyError> {
    HeaderValue::from_str(&value).map_err(|_| CorsPolicyError { field, value })
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Result<Self, CorsPolicyError> {
        Ok(Self {
            allow_origin: header_value("allow_origin", config.allow_origin.clone())?,
            allow_methods: header_value("allow_methods", config.allow_methods.join(", "))?,
            allow_headers: header_value("allow_headers", config.allow_headers.join(", "))?,
            max_age: HeaderValue::from(config.max_age_secs),
        })
    }

    /// Build the `204 No Content` preflight answer.
    pub fn preflight_response(&self) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=UTF-8"),
        );
        response
    }
}
