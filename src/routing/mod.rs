//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Ingress URI (http://host/path?query)
//!     → table.rs (load current snapshot)
//!     → mapping.rs (full-match each pattern, in order)
//!     → Return: first egress URI, or None
//!
//! Admin API / config reload
//!     → table.rs (copy list, mutate copy, swap snapshot)
//! ```
//!
//! # Design Decisions
//! - First match wins, in table order
//! - Regex patterns are compiled once, when a mapping is created
//! - Lookups never block on writers

pub mod mapping;
pub mod table;

use thiserror::Error;

pub use mapping::{Mapping, MappingEntry};
pub use table::{RoutingSnapshot, RoutingTable};

use crate::config::MappingConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("mapping '{0}' already exists")]
    DuplicateId(String),

    #[error("mapping '{0}' not found")]
    NotFound(String),

    #[error("invalid ingress pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Compile config mappings, preserving their order.
pub fn compile_mappings(configs: &[MappingConfig]) -> Result<Vec<Mapping>, RoutingError> {
    configs
        .iter()
        .map(|c| Mapping::new(c.id.clone(), c.ingress.clone(), c.egress.clone()))
        .collect()
}
