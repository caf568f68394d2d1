//! Request handling and transformation.
//!
//! # Responsibilities
//! - Reconstruct the ingress URI the routing table matches against
//! - Filter headers before forwarding to a backend
//! - Build outbound requests with the egress authority as `Host`
//!
//! # Design Decisions
//! - Hop-by-hop headers (and any named by `Connection`) never cross the proxy
//! - The query header is consumed by the gateway, never forwarded
//! - Follow-up GETs reuse the primary request's forwarded headers

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::{Method, Request, Uri};

use crate::http::error::{GatewayError, UpstreamError};
use crate::http::extract::QUERY_HEADER;

/// Request ID header name.
pub const X_REQUEST_ID: &str = "x-request-id";

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    let name = name.as_str();
    HOP_BY_HOP.contains(&name) || name.starts_with("proxy-")
}

/// Remove hop-by-hop headers, including those listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    let hop: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_hop_by_hop(name))
        .cloned()
        .collect();
    for name in hop {
        headers.remove(name);
    }
}

/// Absolute ingress URI: `http://{host}{path}?{query}`.
///
/// The host comes from the request target when it is absolute, else from the
/// `Host` header.
pub fn ingress_uri(parts: &Parts) -> Result<String, GatewayError> {
    let host = parts
        .uri
        .authority()
        .map(|authority| authority.as_str().to_string())
        .or_else(|| {
            parts
                .headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .ok_or_else(|| GatewayError::BadRequest("request has no host".to_string()))?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Ok(format!("http://{host}{path_and_query}"))
}

/// How the primary request's headers should be adjusted for the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardOptions {
    /// The body was read and re-serialized by the gateway.
    pub body_rebuffered: bool,
    /// A projection will read the response body.
    pub query_present: bool,
}

/// Headers to send with the primary request. `Host` is set later by
/// [`build_request`].
pub fn forward_headers(source: &HeaderMap, options: ForwardOptions) -> HeaderMap {
    let mut headers = source.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(QUERY_HEADER);
    if options.body_rebuffered {
        headers.remove(header::CONTENT_LENGTH);
    }
    if options.query_present {
        headers.remove(header::ACCEPT_ENCODING);
    }
    headers
}

/// Headers for a follow-up GET, derived from the forwarded primary headers.
pub fn follow_up_headers(forwarded: &HeaderMap) -> HeaderMap {
    let mut headers = forwarded.clone();
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_TYPE);
    headers
}

/// Build an outbound request to `url`, with `Host` set to its authority.
pub fn build_request(
    method: Method,
    url: &str,
    mut headers: HeaderMap,
    body: Body,
) -> Result<Request<Body>, UpstreamError> {
    let invalid = |reason: &str| UpstreamError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = url.parse().map_err(|e: axum::http::uri::InvalidUri| invalid(&e.to_string()))?;
    if uri.scheme().is_none() {
        return Err(invalid("missing scheme"));
    }
    let authority = uri.authority().ok_or_else(|| invalid("missing authority"))?;
    let host = HeaderValue::from_str(authority.as_str()).map_err(|e| invalid(&e.to_string()))?;
    headers.insert(header::HOST, host);

    let mut request = Request::new(body);
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;
    Ok(request)
}
