//! Query extraction from an inbound request.
//!
//! Sources, in priority order: the `_meshcaline_query` URI parameter, the
//! `X-MESHCALINE-QUERY` header, then a `_meshcaline_query` string field of a
//! JSON object body. The body is only read when the first two are absent and
//! the request declares a JSON content type.
//!
//! When the query comes from the body, the field is removed and the stripped
//! body is what the backend receives. A body larger than the limit is never
//! searched for a query: the bytes already read are replayed ahead of the
//! rest of the stream and forwarded unchanged.

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderMap};
use axum::http::request::Parts;
use axum::http::Uri;
use bytes::BytesMut;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use crate::http::error::GatewayError;

pub const QUERY_PARAM: &str = "_meshcaline_query";
pub const QUERY_HEADER: &str = "x-meshcaline-query";
pub const QUERY_FIELD: &str = "_meshcaline_query";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySource {
    Param,
    Header,
    Body,
}

/// Body to forward after extraction.
#[derive(Debug)]
pub enum ForwardBody {
    /// Untouched, still streaming.
    Original(Body),
    /// Read by the gateway; `content-length` must be recomputed.
    Buffered(Bytes),
}

impl ForwardBody {
    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }

    pub fn into_body(self) -> Body {
        match self {
            Self::Original(body) => body,
            Self::Buffered(bytes) => Body::from(bytes),
        }
    }
}

#[derive(Debug)]
pub struct Extracted {
    pub query: Option<(String, QuerySource)>,
    pub body: ForwardBody,
}

pub async fn extract_query(
    parts: &Parts,
    body: Body,
    max_body_bytes: usize,
) -> Result<Extracted, GatewayError> {
    if let Some(query) = query_from_params(&parts.uri) {
        return Ok(Extracted {
            query: Some((query, QuerySource::Param)),
            body: ForwardBody::Original(body),
        });
    }
    if let Some(query) = query_from_header(&parts.headers) {
        return Ok(Extracted {
            query: Some((query, QuerySource::Header)),
            body: ForwardBody::Original(body),
        });
    }
    if !is_json_content_type(&parts.headers) {
        return Ok(Extracted {
            query: None,
            body: ForwardBody::Original(body),
        });
    }

    let bytes = match buffer_within_limit(body, max_body_bytes).await? {
        Buffered::Complete(bytes) => bytes,
        Buffered::Overflow(body) => {
            tracing::debug!(
                limit = max_body_bytes,
                "JSON body over limit, forwarding without query inspection"
            );
            return Ok(Extracted {
                query: None,
                body: ForwardBody::Original(body),
            });
        }
    };

    match strip_query_field(&bytes) {
        Some((query, stripped)) => Ok(Extracted {
            query: Some((query, QuerySource::Body)),
            body: ForwardBody::Buffered(stripped),
        }),
        None => Ok(Extracted {
            query: None,
            body: ForwardBody::Buffered(bytes),
        }),
    }
}

enum Buffered {
    Complete(Bytes),
    /// The limit was crossed; the body replays every byte it was given.
    Overflow(Body),
}

/// Read `body` whole if it fits in `limit` bytes.
async fn buffer_within_limit(body: Body, limit: usize) -> Result<Buffered, GatewayError> {
    let mut rest = body.into_data_stream();
    let mut buffered = BytesMut::new();

    while let Some(chunk) = rest.next().await {
        let chunk = chunk
            .map_err(|e| GatewayError::BadRequest(format!("failed to read request body: {e}")))?;

        if buffered.len() + chunk.len() > limit {
            let prefix = stream::iter([Ok(buffered.freeze()), Ok(chunk)]);
            return Ok(Buffered::Overflow(Body::from_stream(prefix.chain(rest))));
        }
        buffered.extend_from_slice(&chunk);
    }
    Ok(Buffered::Complete(buffered.freeze()))
}

pub fn query_from_params(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

pub fn query_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(QUERY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// `application/json` or any `+json` media type.
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Remove a string query field from a JSON object body.
///
/// Returns `None` when the body is not an object or carries no string field,
/// in which case the original bytes are forwarded as they are.
pub fn strip_query_field(body: &[u8]) -> Option<(String, Bytes)> {
    let Ok(Value::Object(mut object)) = serde_json::from_slice::<Value>(body) else {
        return None;
    };
    if !matches!(object.get(QUERY_FIELD), Some(Value::String(_))) {
        return None;
    }
    let Some(Value::String(query)) = object.shift_remove(QUERY_FIELD) else {
        return None;
    };
    let stripped = Value::Object(object).to_string();
    Some((query, Bytes::from(stripped)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn split(request: Request<Body>) -> (Parts, Body) {
        request.into_parts()
    }

    async fn body_text(body: ForwardBody) -> String {
        let bytes = axum::body::to_bytes(body.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_param_wins_over_header_and_body() {
        let (parts, body) = split(
            Request::post("/dogs?_meshcaline_query=%7B%20name%20%7D&x=1")
                .header("x-meshcaline-query", "{ header }")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"_meshcaline_query":"{ body }"}"#))
                .unwrap(),
        );
        let extracted = extract_query(&parts, body, 1024).await.unwrap();
        assert_eq!(
            extracted.query,
            Some(("{ name }".to_string(), QuerySource::Param))
        );
        assert!(!extracted.body.is_buffered());
        assert_eq!(
            body_text(extracted.body).await,
            r#"{"_meshcaline_query":"{ body }"}"#
        );
    }

    #[tokio::test]
    async fn test_header_wins_over_body() {
        let (parts, body) = split(
            Request::post("/dogs")
                .header("X-MESHCALINE-QUERY", "{ header }")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"_meshcaline_query":"{ body }"}"#))
                .unwrap(),
        );
        let extracted = extract_query(&parts, body, 1024).await.unwrap();
        assert_eq!(
            extracted.query,
            Some(("{ header }".to_string(), QuerySource::Header))
        );
    }

    #[tokio::test]
    async fn test_body_field_is_stripped() {
        let (parts, body) = split(
            Request::post("/dogs")
                .header("content-type", "application/json; charset=utf-8")
                .body(Body::from(r#"{"a":1,"_meshcaline_query":"{ a }","b":2}"#))
                .unwrap(),
        );
        let extracted = extract_query(&parts, body, 1024).await.unwrap();
        assert_eq!(extracted.query, Some(("{ a }".to_string(), QuerySource::Body)));
        assert!(extracted.body.is_buffered());
        assert_eq!(body_text(extracted.body).await, r#"{"a":1,"b":2}"#);
    }

    #[tokio::test]
    async fn test_non_json_body_is_not_read() {
        let (parts, body) = split(
            Request::post("/dogs")
                .header("content-type", "text/plain")
                .body(Body::from(r#"{"_meshcaline_query":"{ a }"}"#))
                .unwrap(),
        );
        let extracted = extract_query(&parts, body, 1024).await.unwrap();
        assert_eq!(extracted.query, None);
        assert!(!extracted.body.is_buffered());
    }

    #[tokio::test]
    async fn test_json_body_without_field_is_forwarded_verbatim() {
        let original = r#"{ "a" : [1, 2] }"#;
        let (parts, body) = split(
            Request::post("/dogs")
                .header("content-type", "application/vnd.api+json")
                .body(Body::from(original))
                .unwrap(),
        );
        let extracted = extract_query(&parts, body, 1024).await.unwrap();
        assert_eq!(extracted.query, None);
        assert_eq!(body_text(extracted.body).await, original);
    }

    #[tokio::test]
    async fn test_oversized_body_is_forwarded_unchanged() {
        let original = format!(r#"{{"_meshcaline_query":"{{ a }}","pad":"{}"}}"#, "x".repeat(64));
        let (parts, body) = split(
            Request::post("/dogs")
                .header("content-type", "application/json")
                .body(Body::from(original.clone()))
                .unwrap(),
        );
        let extracted = extract_query(&parts, body, 16).await.unwrap();
        assert_eq!(extracted.query, None);
        assert!(!extracted.body.is_buffered());
        assert_eq!(body_text(extracted.body).await, original);
    }

    #[tokio::test]
    async fn test_oversized_streaming_body_keeps_chunk_order() {
        let chunks = ["{\"a\":", "\"0123456789\"", ",\"b\":1}"];
        let body = Body::from_stream(stream::iter(
            chunks.map(|chunk| Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()))),
        ));
        let (parts, _) = split(
            Request::post("/dogs")
                .header("content-type", "application/json")
                .body(Body::empty())
                .unwrap(),
        );
        let extracted = extract_query(&parts, body, 10).await.unwrap();
        assert_eq!(extracted.query, None);
        assert_eq!(body_text(extracted.body).await, chunks.concat());
    }

    #[tokio::test]
    async fn test_body_at_limit_is_inspected() {
        let original = r#"{"_meshcaline_query":"{ a }"}"#;
        let (parts, body) = split(
            Request::post("/dogs")
                .header("content-type", "application/json")
                .body(Body::from(original))
                .unwrap(),
        );
        let extracted = extract_query(&parts, body, original.len()).await.unwrap();
        assert_eq!(extracted.query, Some(("{ a }".to_string(), QuerySource::Body)));
    }

    #[test]
    fn test_strip_ignores_non_string_field() {
        assert!(strip_query_field(br#"{"_meshcaline_query": 1}"#).is_none());
        assert!(strip_query_field(br#"["_meshcaline_query"]"#).is_none());
        assert!(strip_query_field(b"not json").is_none());
    }
}
