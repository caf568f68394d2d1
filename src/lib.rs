//! meshcaline gateway library.
//!
//! A reverse proxy that routes by regex mapping and, when the caller supplies
//! a query, projects the backend's JSON and streams follow-up documents as
//! multipart/mixed.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod multipart;
pub mod observability;
pub mod query;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
