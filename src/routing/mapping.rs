//! A single ingress → egress rewrite rule.
//!
//! # Design Decisions
//! - The ingress pattern must match the whole URI; it is compiled anchored
//! - The egress is the pattern's replacement over the URI, so `$1`, `${1}`
//!   and `${name}` refer to ingress capture groups

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::routing::RoutingError;

/// A compiled mapping.
#[derive(Debug, Clone)]
pub struct Mapping {
    id: String,
    ingress: String,
    egress: String,
    pattern: Regex,
}

/// Wire/listing view of a mapping.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MappingEntry {
    pub id: String,
    pub ingress: String,
    pub egress: String,
}

impl Mapping {
    /// Compile a mapping, generating an id when none is given.
    pub fn new(
        id: Option<String>,
        ingress: impl Into<String>,
        egress: impl Into<String>,
    ) -> Result<Self, RoutingError> {
        let ingress = ingress.into();
        let pattern = Self::compile_pattern(&ingress)?;
        Ok(Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            ingress,
            egress: egress.into(),
            pattern,
        })
    }

    /// Compile an ingress pattern as a full-string match.
    pub fn compile_pattern(ingress: &str) -> Result<Regex, RoutingError> {
        Regex::new(&format!("^(?:{ingress})$")).map_err(|e| RoutingError::InvalidPattern {
            pattern: ingress.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ingress(&self) -> &str {
        &self.ingress
    }

    pub fn egress(&self) -> &str {
        &self.egress
    }

    /// Egress URI for `uri`, or `None` if the pattern does not match it.
    pub fn egress_for(&self, uri: &str) -> Option<String> {
        let captures = self.pattern.captures(uri)?;
        let mut egress = String::new();
        captures.expand(&self.egress, &mut egress);
        Some(egress)
    }

    pub fn entry(&self) -> MappingEntry {
        MappingEntry {
            id: self.id.clone(),
            ingress: self.ingress.clone(),
            egress: self.egress.clone(),
        }
    }
}
