//! Outbound fetches.
//!
//! # Responsibilities
//! - Send a request to a backend and enforce the fetch deadline
//! - Turn any status ≥ 400 into an error carrying the backend body
//! - Read bounded bodies and parse JSON bodies
//!
//! # Design Decisions
//! - [`Transport`] is the seam to the HTTP client; tests substitute it
//! - No retries: a failed fetch fails the request

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;

use crate::http::error::UpstreamError;

/// Sends one request and yields the response head with a streaming body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError>;
}

/// Pooled hyper client with a per-fetch deadline.
///
/// The deadline covers connecting and receiving the response head.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        let url = request.uri().to_string();
        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response.map(|body: Incoming| Body::new(body))),
            Ok(Err(e)) => Err(UpstreamError::Transport {
                url,
                reason: e.to_string(),
            }),
            Err(_) => Err(UpstreamError::Timeout {
                url,
                timeout: self.timeout,
            }),
        }
    }
}

/// Fetch contract on top of a [`Transport`].
#[derive(Clone)]
pub struct UpstreamClient {
    transport: Arc<dyn Transport>,
    max_body_bytes: usize,
}

impl UpstreamClient {
    pub fn new(transport: Arc<dyn Transport>, max_body_bytes: usize) -> Self {
        Self {
            transport,
            max_body_bytes,
        }
    }

    /// Send `request`; a status ≥ 400 is an error with the body attached.
    pub async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        let url = request.uri().to_string();
        let response = self.transport.send(request).await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            // The status is the failure; a body that cannot be read is just omitted.
            let body = axum::body::to_bytes(response.into_body(), self.max_body_bytes)
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();
            return Err(UpstreamError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    pub async fn read_body(&self, url: &str, body: Body) -> Result<Bytes, UpstreamError> {
        axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| UpstreamError::Body {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    pub async fn read_json(&self, url: &str, body: Body) -> Result<Value, UpstreamError> {
        let bytes = self.read_body(url, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::InvalidJson {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}
