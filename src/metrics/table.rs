//! Per-surface collector ownership.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::collector::{Collector, CollectorSpec};
use super::registry::{MetricRegistry, OwnerKey};
use crate::error::{MetricsError, MetricsResult};

#[derive(Debug)]
struct TableEntry {
    collector: Collector,
    keys: Vec<String>,
}

/// The collectors one surface has created, keyed by fully-qualified name.
///
/// Creation is idempotent per name: concurrent callers asking for the same
/// name all observe a single collector, and the table takes exactly one share
/// of it from the [`MetricRegistry`]. Removal only gives back this table's
/// shares, so collectors of other surfaces in the same registry are never
/// affected.
pub struct CollectorTable {
    registry: Arc<MetricRegistry>,
    owner: OwnerKey,
    entries: DashMap<String, TableEntry>,
}

impl CollectorTable {
    pub fn new(registry: Arc<MetricRegistry>, owner: &[(String, String)]) -> Self {
        Self {
            registry,
            owner: owner.to_vec(),
            entries: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Return the collector named `spec.name`, creating it on first use.
    pub fn get_or_create(&self, spec: &CollectorSpec<'_>) -> MetricsResult<Collector> {
        if let Some(entry) = self.entries.get(spec.name) {
            return check_shape(spec, &entry);
        }

        // The shard lock is held while the registry share is taken, so two
        // racing callers cannot both acquire.
        let entry = self
            .entries
            .entry(spec.name.to_string())
            .or_try_insert_with(|| {
                self.registry
                    .acquire(spec, &self.owner)
                    .map(|collector| TableEntry {
                        collector,
                        keys: spec.keys.to_vec(),
                    })
            })?;
        check_shape(spec, &entry)
    }

    /// Look up a collector without creating it.
    pub fn get(&self, name: &str) -> Option<Collector> {
        self.entries.get(name).map(|e| e.collector.clone())
    }

    /// Forget `name` and give back its registry share. No-op if absent.
    pub fn remove(&self, name: &str) {
        if self.entries.remove(name).is_some() {
            self.registry.release(name, &self.owner);
        }
    }

    /// Forget every collector this table owns.
    pub fn remove_all(&self) {
        let names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for name in &names {
            self.remove(name);
        }
        if !names.is_empty() {
            debug!(count = names.len(), "released surface collectors");
        }
    }

    /// `(name, collector)` pairs whose name starts with `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> Vec<(String, Collector)> {
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value().collector.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_shape(spec: &CollectorSpec<'_>, entry: &TableEntry) -> MetricsResult<Collector> {
    if entry.collector.kind() != spec.kind || entry.keys != spec.keys {
        return Err(MetricsError::ShapeConflict {
            name: spec.name.to_string(),
            existing: entry.collector.kind(),
            existing_keys: entry.keys.clone(),
            requested: spec.kind,
            requested_keys: spec.keys.to_vec(),
        });
    }
    Ok(entry.collector.clone())
}
