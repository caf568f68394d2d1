//! Response construction for the three gateway outcomes.
//!
//! # Responsibilities
//! - Passthrough: stream the backend response to the client unchanged
//! - Projected: the filtered JSON under the backend's status and headers
//! - Multipart: the primary part followed by every follow-up part
//!
//! # Design Decisions
//! - Hop-by-hop headers are stripped on every path
//! - Projected bodies are re-serialized, so length and encoding headers are
//!   dropped and recomputed by the server
//! - A multipart body that fails mid-stream is aborted, never closed

use std::future::ready;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::response::Parts;
use axum::http::{Response, StatusCode};
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;

use crate::http::error::GatewayError;
use crate::http::request::strip_hop_by_hop;
use crate::multipart::{MultipartEncoder, Part};

/// How a request was answered; used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Passthrough,
    Projected,
    Multipart,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Projected => "projected",
            Self::Multipart => "multipart",
        }
    }
}

pub fn passthrough(response: Response<Body>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, body)
}

pub fn projected(parts: Parts, target: &Value) -> Response<Body> {
    let mut parts = parts;
    strip_body_headers(&mut parts.headers);
    Response::from_parts(parts, Body::from(target.to_string()))
}

/// Stream `primary` then `rest` as multipart/mixed.
///
/// Headers are replaced by the multipart content type.
pub fn multipart(
    status: StatusCode,
    primary: Part,
    rest: BoxStream<'static, Result<Part, GatewayError>>,
    request_id: String,
) -> Result<Response<Body>, GatewayError> {
    let parts = stream::once(ready(Ok(primary))).chain(rest);
    let encoder = MultipartEncoder::new(parts);
    let content_type = HeaderValue::try_from(encoder.content_type())
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    let body = encoder.inspect_err(move |e| {
        tracing::error!(
            request_id = %request_id,
            error = %e,
            "Aborting multipart response"
        );
    });

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    Ok(response)
}

fn strip_body_headers(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_ENCODING);
}
