//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → request.rs (ingress URI, header forwarding)
//!     → extract.rs (optional query: param / header / body)
//!     → upstream.rs (primary fetch through the Transport)
//!     → [query projector] (crate::query)
//!     → follow_up.rs (ordered follow-up fetches, recursive)
//!     → response.rs (passthrough / projected / multipart)
//!     → Send to client
//! ```

pub mod error;
pub mod extract;
pub mod follow_up;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use error::{GatewayError, GatewayResult, UpstreamError};
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
pub use upstream::{HyperTransport, Transport, UpstreamClient};
