//! Admin API for the routing table.
//!
//! # Endpoints
//! - `GET    /admin/status`          version and routing table summary
//! - `GET    /admin/mappings`        ordered mapping list
//! - `POST   /admin/mappings`        append a mapping (201, 409, 400)
//! - `PUT    /admin/mappings/{id}`   replace a mapping in place (200, 404, 400)
//! - `DELETE /admin/mappings/{id}`   remove a mapping (204, 404)
//!
//! # Design Decisions
//! - Unauthenticated; binds to localhost by default
//! - Changes are not persisted and are replaced by a config file reload

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};

use crate::routing::RoutingTable;
use self::handlers::*;

pub fn router(routing: Arc<RoutingTable>) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/mappings", get(list_mappings).post(add_mapping))
        .route("/admin/mappings/{id}", put(update_mapping).delete(delete_mapping))
        .with_state(routing)
}
