//! Forwarding to the backend.
//!
//! The request keeps its method, path, query and body; the body is streamed,
//! not buffered. Only the URI authority, HTTP version and forwarding headers
//! change. The upstream response is relayed as received.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        uri::{Authority, Scheme},
        Request, Response, Uri, Version,
    },
};
use http_body_util::{BodyExt, LengthLimitError};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::http::response::ForwardError;
use crate::security::headers::{self, ForwardedContext};

/// Pooled plain-HTTP client used for every upstream call.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// Build the upstream client.
pub fn build_client(connect_timeout: Duration) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Invalid upstream URL.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),

    #[error("upstream must use http, got '{0}'")]
    Scheme(String),

    #[error("upstream url has no host")]
    MissingHost,

    #[error("upstream url must not carry a path, got '{0}'")]
    Path(String),

    #[error("invalid upstream authority: {0}")]
    Authority(#[from] axum::http::uri::InvalidUri),
}

/// Where forwarded requests go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    authority: Authority,
}

impl Upstream {
    /// Parse a base URL such as `http://127.0.0.1:8080`.
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let url = Url::parse(raw)?;
        if url.scheme() != "http" {
            return Err(UpstreamError::Scheme(url.scheme().to_string()));
        }
        if url.path() != "/" || url.query().is_some() {
            return Err(UpstreamError::Path(url.path().to_string()));
        }
        let host = url.host_str().ok_or(UpstreamError::MissingHost)?;
        let port = url.port_or_known_default().unwrap_or(80);
        let authority = Authority::from_str(&format!("{}:{}", host, port))?;
        Ok(Self { authority })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Host part, used as `Host` when the client sent none.
    pub fn host(&self) -> &str {
        self.authority.host()
    }

    /// Rewrite a client URI to target this upstream, keeping path and query.
    pub fn uri_for(&self, original: &Uri) -> Result<Uri, axum::http::Error> {
        let path_and_query = original
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "http://{}", self.authority)
    }
}

/// Per-request forwarding parameters.
#[derive(Debug, Clone)]
pub struct ForwardTarget<'a> {
    pub upstream: &'a Upstream,
    pub forwarded_proto: &'a str,
    pub timeout: Duration,
}

/// Whether `err`, or anything it wraps, is a request body over the size limit.
pub fn is_length_limit(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Relay `request` from `client_addr` to the upstream.
///
/// A streamed body that outgrows the body limit mid-flight aborts the
/// upstream request and yields [`ForwardError::PayloadTooLarge`].
pub async fn forward(
    client: &UpstreamClient,
    target: &ForwardTarget<'_>,
    client_addr: SocketAddr,
    request: Request<Body>,
) -> Result<Response<Body>, ForwardError> {
    let (mut parts, body) = request.into_parts();

    let host = headers::client_host(&parts.headers, &parts.uri)
        .unwrap_or_else(|| target.upstream.host().to_string());

    parts.uri = target.upstream.uri_for(&parts.uri)?;
    // Upstream speaks HTTP/1.1 regardless of what the client negotiated.
    parts.version = Version::HTTP_11;

    headers::strip_hop_by_hop(&mut parts.headers);
    headers::apply_forwarding(
        &mut parts.headers,
        &ForwardedContext {
            client_ip: client_addr.ip(),
            host: &host,
            proto: target.forwarded_proto,
        },
    );

    let over_limit = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&over_limit);
    let body = Body::new(body.map_err(move |e| {
        if is_length_limit(&e) {
            flag.store(true, Ordering::Relaxed);
        }
        e
    }));

    let request = Request::from_parts(parts, body);
    let response: Response<Incoming> =
        match tokio::time::timeout(target.timeout, client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if over_limit.load(Ordering::Relaxed) || is_length_limit(&e) => {
                return Err(ForwardError::PayloadTooLarge);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ForwardError::Timeout(target.timeout)),
        };

    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}
