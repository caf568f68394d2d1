//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use meshcaline_proxy::config::{MappingConfig, ProxyConfig};
use meshcaline_proxy::http::HttpServer;
use meshcaline_proxy::lifecycle::Shutdown;
use meshcaline_proxy::routing::RoutingTable;

/// Serve `router` on an ephemeral port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Backend with an owner, two pets and a failing resource.
///
/// Returns the address and a counter of requests served.
pub async fn start_pet_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));

    let counted = |hits: Arc<AtomicUsize>, status: StatusCode, body: Value| {
        move || {
            let hits = hits.clone();
            let body = body.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (status, Json(body))
            }
        }
    };

    let router = Router::new()
        .route(
            "/owners/1",
            get(counted(
                hits.clone(),
                StatusCode::OK,
                json!({
                    "name": "ann",
                    "age": 40,
                    "pets": [{ "href": "/api/pets/1" }, { "href": "/api/pets/2" }]
                }),
            )),
        )
        .route(
            "/owners/2",
            get(counted(
                hits.clone(),
                StatusCode::OK,
                json!({ "name": "bob", "pets": [{ "href": "/api/broken" }] }),
            )),
        )
        .route(
            "/pets/1",
            get(counted(
                hits.clone(),
                StatusCode::OK,
                json!({ "name": "rex", "species": "dog" }),
            )),
        )
        .route(
            "/pets/2",
            get(counted(
                hits.clone(),
                StatusCode::OK,
                json!({ "name": "tom", "species": "cat" }),
            )),
        )
        .route(
            "/broken",
            get(counted(
                hits.clone(),
                StatusCode::INTERNAL_SERVER_ERROR,
                json!("kaput"),
            )),
        );

    (serve(router).await, hits)
}

/// Route `http://<any host>/api/<rest>` to `http://<backend>/<rest>`.
pub fn api_mapping(backend: SocketAddr) -> MappingConfig {
    MappingConfig {
        id: Some("api".into()),
        ingress: r"http://[^/]+/api/(.*)".into(),
        egress: format!("http://{backend}/${{1}}"),
    }
}

pub struct Gateway {
    pub addr: SocketAddr,
    pub routing: Arc<RoutingTable>,
    pub updates: mpsc::UnboundedSender<ProxyConfig>,
    pub shutdown: Shutdown,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the gateway on an ephemeral port.
pub async fn start_gateway(mut config: ProxyConfig) -> Gateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();
    config.admin.enabled = false;

    let server = HttpServer::new(config).unwrap();
    let routing = server.routing();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();
    tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    Gateway {
        addr,
        routing,
        updates,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Split a multipart/mixed body into `(headers, content)` pairs.
pub fn split_multipart(body: &str, boundary: &str) -> Vec<(String, String)> {
    let closing = format!("--{boundary}--\r\n");
    let body = body
        .strip_suffix(&closing)
        .expect("multipart body must end with the closing boundary");

    body.split(&format!("--{boundary}\r\n"))
        .skip(1)
        .map(|part| {
            if let Some(content) = part.strip_prefix("\r\n") {
                let content = content.strip_suffix("\r\n").unwrap_or(content);
                return (String::new(), content.to_string());
            }
            let (headers, content) = part
                .split_once("\r\n\r\n")
                .expect("part must separate headers from content");
            let content = content.strip_suffix("\r\n").unwrap_or(content);
            (headers.to_string(), content.to_string())
        })
        .collect()
}
