//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers before forwarding
//! - Set `Host`, `X-Real-IP`, `X-Forwarded-For`, `X-Forwarded-Proto`
//!
//! # Design Decisions
//! - `Host` is the client's host without port, matching what a classic
//!   TLS terminator passes to its backend
//! - `X-Forwarded-For` keeps any chain the client sent and appends the peer

use std::net::IpAddr;

use axum::http::{header, uri::Authority, HeaderMap, HeaderName, HeaderValue, Uri};

pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Host the client addressed, without port.
///
/// Prefers the `Host` header; HTTP/2 clients only carry it in the URI
/// authority.
pub fn client_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Authority>().ok());

    from_header
        .or_else(|| uri.authority().cloned())
        .map(|authority| authority.host().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
}

/// Client address and scheme as seen by the edge.
#[derive(Debug, Clone)]
pub struct ForwardedContext<'a> {
    pub client_ip: IpAddr,
    pub host: &'a str,
    pub proto: &'a str,
}

/// Build the `X-Forwarded-For` value: prior chain, then the client address.
pub fn forwarded_for(headers: &HeaderMap, client_ip: IpAddr) -> String {
    let mut chain: Vec<String> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    chain.push(client_ip.to_string());
    chain.join(", ")
}

/// Overwrite the four forwarding headers.
pub fn apply_forwarding(headers: &mut HeaderMap, ctx: &ForwardedContext<'_>) {
    let xff = forwarded_for(headers, ctx.client_ip);

    let values = [
        (header::HOST, ctx.host.to_string()),
        (X_REAL_IP.clone(), ctx.client_ip.to_string()),
        (X_FORWARDED_FOR.clone(), xff),
        (X_FORWARDED_PROTO.clone(), ctx.proto.to_string()),
    ];

    for (name, value) in values {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => {
                tracing::warn!(header = %name, value = %value, "Dropping unrepresentable forwarding header");
                headers.remove(name);
            }
        }
    }
}
