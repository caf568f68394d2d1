//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every mapping pattern compiles
//! - Detect duplicate mapping ids
//! - Validate value ranges and bind addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::routing::Mapping;

/// A single semantic problem, located by its dotted config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let mut seen = HashSet::new();
    for (index, mapping) in config.mappings.iter().enumerate() {
        if let Err(e) = Mapping::compile_pattern(&mapping.ingress) {
            errors.push(ValidationError::new(
                format!("mappings[{index}].ingress"),
                e.to_string(),
            ));
        }
        if let Some(id) = &mapping.id {
            if !seen.insert(id.as_str()) {
                errors.push(ValidationError::new(
                    format!("mappings[{index}].id"),
                    format!("duplicate mapping id '{id}'"),
                ));
            }
        }
    }

    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new(
            "upstream.timeout_secs",
            "must be at least 1 second",
        ));
    }
    if config.upstream.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "upstream.max_body_bytes",
            "must be greater than zero",
        ));
    }
    if config.query.follow_up_concurrency == 0 {
        errors.push(ValidationError::new(
            "query.follow_up_concurrency",
            "must be at least 1",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{value}' is not a socket address"),
        ));
    }
}
