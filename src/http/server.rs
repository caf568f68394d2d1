//! HTTP server setup and the per-request gateway pipeline.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Resolve egress, extract the query, forward the primary request
//! - Choose passthrough, projected or multipart response
//! - Apply config reloads to the routing table
//! - Run the admin API next to the proxy when enabled
//!
//! # Data Flow
//! ```text
//! request
//!     → ingress URI → routing snapshot → egress (or NoRoute)
//!     → extract query (param / header / JSON body)
//!     → parse query (before any fetch)
//!     → primary fetch
//!     → no query:  passthrough
//!     → query:     read JSON → project
//!                  → no follow-ups: projected JSON
//!                  → follow-ups:    multipart(primary, follow_up_parts)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use url::Url;

use crate::admin;
use crate::config::ProxyConfig;
use crate::http::error::{GatewayError, GatewayResult};
use crate::http::extract::extract_query;
use crate::http::follow_up::{follow_up_parts, part_headers, FollowUpContext};
use crate::http::request::{
    build_request, follow_up_headers, forward_headers, ingress_uri, ForwardOptions, X_REQUEST_ID,
};
use crate::http::response::{self, ResponseMode};
use crate::http::upstream::{HyperTransport, Transport, UpstreamClient};
use crate::multipart::Part;
use crate::observability::metrics;
use crate::query::{parse_document, project};
use crate::routing::{compile_mappings, RoutingError, RoutingTable};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routing: Arc<RoutingTable>,
    pub client: UpstreamClient,
    pub max_body_bytes: usize,
    pub follow_up_concurrency: usize,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    routing: Arc<RoutingTable>,
}

impl HttpServer {
    /// Create a server that fetches over plain HTTP.
    pub fn new(config: ProxyConfig) -> Result<Self, RoutingError> {
        let transport = HyperTransport::new(Duration::from_secs(config.upstream.timeout_secs));
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a server on top of a custom transport.
    pub fn with_transport(
        config: ProxyConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RoutingError> {
        let routing = Arc::new(RoutingTable::new(compile_mappings(&config.mappings)?)?);

        let state = AppState {
            routing: routing.clone(),
            client: UpstreamClient::new(transport, config.upstream.max_body_bytes),
            max_body_bytes: config.upstream.max_body_bytes,
            follow_up_concurrency: config.query.follow_up_concurrency,
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            config,
            routing,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn routing(&self) -> Arc<RoutingTable> {
        self.routing.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve until `shutdown` fires.
    ///
    /// Configs received on `config_updates` replace the routing table. The
    /// admin API is started on its own listener when enabled.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mappings = self.routing.snapshot().len(),
            "HTTP server starting"
        );

        tokio::spawn(apply_config_updates(self.routing.clone(), config_updates));

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_router = admin::router(self.routing.clone());
            let mut admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API starting");
            tokio::spawn(async move {
                let result = axum::serve(admin_listener, admin_router)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_config_updates(
    routing: Arc<RoutingTable>,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
) {
    while let Some(config) = updates.recv().await {
        match compile_mappings(&config.mappings).and_then(|m| routing.replace(m)) {
            Ok(version) => tracing::info!(
                version,
                mappings = config.mappings.len(),
                "Routing table reloaded"
            ),
            Err(e) => tracing::error!(error = %e, "Rejected routing table reload"),
        }
    }
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    match handle(&state, request, &request_id).await {
        Ok((response, mode)) => {
            metrics::record_request(&method, response.status().as_u16(), mode.as_str(), start);
            response
        }
        Err(e) => {
            let status = e.status_code();
            tracing::warn!(
                request_id = %request_id,
                status = status.as_u16(),
                error = %e,
                "Request failed"
            );
            metrics::record_request(&method, status.as_u16(), "error", start);
            e.into_response()
        }
    }
}

async fn handle(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
) -> GatewayResult<(Response, ResponseMode)> {
    let (parts, body) = request.into_parts();

    let ingress = ingress_uri(&parts)?;
    let egress = state
        .routing
        .resolve_egress(&ingress)
        .ok_or_else(|| GatewayError::NoRoute {
            uri: ingress.clone(),
        })?;

    let extracted = extract_query(&parts, body, state.max_body_bytes).await?;
    let document = match &extracted.query {
        Some((query, _)) => Some(Arc::new(parse_document(query)?)),
        None => None,
    };

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        ingress = %ingress,
        egress = %egress,
        query_source = ?extracted.query.as_ref().map(|(_, source)| *source),
        "Proxying request"
    );

    let mut headers = forward_headers(
        &parts.headers,
        ForwardOptions {
            body_rebuffered: extracted.body.is_buffered(),
            query_present: document.is_some(),
        },
    );
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID, value);
    }

    let upstream_request = build_request(
        parts.method.clone(),
        &egress,
        headers.clone(),
        extracted.body.into_body(),
    )?;
    let upstream_response = state.client.fetch(upstream_request).await?;

    let Some(document) = document else {
        return Ok((response::passthrough(upstream_response), ResponseMode::Passthrough));
    };

    let (response_parts, body) = upstream_response.into_parts();
    let source = state.client.read_json(&egress, body).await?;
    let projection = project(&source, &document)?;

    if projection.follow_ups.is_empty() {
        return Ok((
            response::projected(response_parts, &projection.target),
            ResponseMode::Projected,
        ));
    }

    tracing::debug!(
        request_id = %request_id,
        follow_ups = projection.follow_ups.len(),
        "Streaming multipart response"
    );

    let base = Url::parse(&ingress).map_err(|e| GatewayError::BadRequest(e.to_string()))?;
    let ctx = Arc::new(FollowUpContext {
        client: state.client.clone(),
        routing: state.routing.clone(),
        base,
        headers: follow_up_headers(&headers),
        concurrency: state.follow_up_concurrency,
        request_id: request_id.to_string(),
    });

    let primary = Part::new(
        part_headers(&response_parts.headers),
        projection.target.to_string(),
    );
    let rest = follow_up_parts(ctx, projection.follow_ups);
    let response = response::multipart(
        response_parts.status,
        primary,
        rest,
        request_id.to_string(),
    )?;
    Ok((response, ResponseMode::Multipart))
}
