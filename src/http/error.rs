//! Gateway error taxonomy and its HTTP mapping.
//!
//! Every failure a client can observe is a [`GatewayError`]. Errors raised
//! before the response head is sent become a JSON error body:
//!
//! ```text
//! {"error": {"code": 502, "type": "upstream_status", "message": "...", "upstream": {...}}}
//! ```

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::query::{ParseError, ProjectionError};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure of an outbound fetch, primary or follow-up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream {url} returned status {status}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("upstream {url} returned invalid JSON: {reason}")]
    InvalidJson { url: String, reason: String },

    #[error("failed to read body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("invalid upstream URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl UpstreamError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Status { .. } => "upstream_status",
            Self::Transport { .. } => "upstream_transport",
            Self::Timeout { .. } => "upstream_timeout",
            Self::InvalidJson { .. } => "upstream_invalid_json",
            Self::Body { .. } => "upstream_body",
            Self::InvalidUrl { .. } => "upstream_invalid_url",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route for {uri}")]
    NoRoute { uri: String },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("invalid query: {0}")]
    InvalidQuery(#[from] ParseError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoRoute { .. } => StatusCode::NOT_FOUND,
            Self::Upstream(UpstreamError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Projection(ProjectionError::InvalidDirective { .. }) => StatusCode::BAD_REQUEST,
            Self::Projection(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NoRoute { .. } => "no_route",
            Self::Upstream(e) => e.error_type(),
            Self::InvalidQuery(_) => "invalid_query",
            Self::Projection(ProjectionError::MissingField { .. }) => "missing_field",
            Self::Projection(ProjectionError::UnsupportedShape { .. }) => "unsupported_shape",
            Self::Projection(ProjectionError::InvalidDirective { .. }) => "invalid_directive",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut error = json!({
            "code": status.as_u16(),
            "type": self.error_type(),
            "message": self.to_string(),
        });

        if let Self::Upstream(UpstreamError::Status {
            url,
            status: upstream_status,
            body,
        }) = &self
        {
            error["upstream"] = json!({
                "url": url,
                "status": upstream_status,
                "body": body,
            });
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
