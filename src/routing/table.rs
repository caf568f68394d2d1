//! The shared routing table.
//!
//! # Responsibilities
//! - Resolve an ingress URI to an egress URI (first match wins)
//! - Serve CRUD mutations from the admin API
//! - Replace the whole table on config reload
//!
//! # Design Decisions
//! - Readers load an immutable, versioned snapshot through `ArcSwap`; a
//!   request never sees a partially updated list
//! - Writers are serialized by a mutex, copy the current list, change the
//!   copy and swap it in

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;

use crate::routing::mapping::{Mapping, MappingEntry};
use crate::routing::RoutingError;

/// An immutable view of the mappings at one point in time.
#[derive(Debug, Default)]
pub struct RoutingSnapshot {
    version: u64,
    mappings: Vec<Mapping>,
}

impl RoutingSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn resolve_egress(&self, ingress: &str) -> Option<String> {
        self.mappings.iter().find_map(|m| m.egress_for(ingress))
    }
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    current: ArcSwap<RoutingSnapshot>,
    writer: Mutex<()>,
}

impl RoutingTable {
    /// Build a table from already-compiled mappings.
    ///
    /// Fails with `DuplicateId` if two mappings share an id.
    pub fn new(mappings: Vec<Mapping>) -> Result<Self, RoutingError> {
        ensure_unique(&mappings)?;
        Ok(Self {
            current: ArcSwap::from_pointee(RoutingSnapshot {
                version: 0,
                mappings,
            }),
            writer: Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.current.load_full()
    }

    pub fn resolve_egress(&self, ingress: &str) -> Option<String> {
        self.current.load().resolve_egress(ingress)
    }

    pub fn list(&self) -> Vec<MappingEntry> {
        self.current.load().mappings.iter().map(Mapping::entry).collect()
    }

    pub fn get(&self, id: &str) -> Option<MappingEntry> {
        self.current
            .load()
            .mappings
            .iter()
            .find(|m| m.id() == id)
            .map(Mapping::entry)
    }

    /// Append a mapping at the end of the table.
    pub fn add(&self, mapping: Mapping) -> Result<MappingEntry, RoutingError> {
        let _guard = self.lock_writer();
        let current = self.current.load_full();
        if current.mappings.iter().any(|m| m.id() == mapping.id()) {
            return Err(RoutingError::DuplicateId(mapping.id().to_string()));
        }

        let entry = mapping.entry();
        let mut mappings = current.mappings.clone();
        mappings.push(mapping);
        self.publish(&current, mappings);
        Ok(entry)
    }

    /// Replace the mapping with `id` in place, keeping its position.
    pub fn update(
        &self,
        id: &str,
        ingress: &str,
        egress: &str,
    ) -> Result<MappingEntry, RoutingError> {
        let replacement = Mapping::new(Some(id.to_string()), ingress, egress)?;

        let _guard = self.lock_writer();
        let current = self.current.load_full();
        let position = current
            .mappings
            .iter()
            .position(|m| m.id() == id)
            .ok_or_else(|| RoutingError::NotFound(id.to_string()))?;

        let entry = replacement.entry();
        let mut mappings = current.mappings.clone();
        mappings[position] = replacement;
        self.publish(&current, mappings);
        Ok(entry)
    }

    pub fn delete(&self, id: &str) -> Result<MappingEntry, RoutingError> {
        let _guard = self.lock_writer();
        let current = self.current.load_full();
        let position = current
            .mappings
            .iter()
            .position(|m| m.id() == id)
            .ok_or_else(|| RoutingError::NotFound(id.to_string()))?;

        let mut mappings = current.mappings.clone();
        let removed = mappings.remove(position);
        self.publish(&current, mappings);
        Ok(removed.entry())
    }

    /// Swap in a whole new list (config reload).
    pub fn replace(&self, mappings: Vec<Mapping>) -> Result<u64, RoutingError> {
        ensure_unique(&mappings)?;
        let _guard = self.lock_writer();
        let current = self.current.load_full();
        Ok(self.publish(&current, mappings))
    }

    fn publish(&self, previous: &RoutingSnapshot, mappings: Vec<Mapping>) -> u64 {
        let version = previous.version + 1;
        self.current
            .store(Arc::new(RoutingSnapshot { version, mappings }));
        tracing::debug!(version, "Routing table updated");
        version
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock holds no broken state.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_unique(mappings: &[Mapping]) -> Result<(), RoutingError> {
    let mut seen = std::collections::HashSet::new();
    for mapping in mappings {
        if !seen.insert(mapping.id()) {
            return Err(RoutingError::DuplicateId(mapping.id().to_string()));
        }
    }
    Ok(())
}
