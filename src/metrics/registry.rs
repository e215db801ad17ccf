//! Process-scoped collector registry.
//!
//! [`MetricRegistry`] wraps a `prometheus::Registry` and is the single arbiter
//! of which fully-qualified metric names are registered. Several surfaces may
//! share one name (two HTTP servers on different local addresses both own
//! `http_servers_requests`); the registry counts owners per name and only
//! unregisters the collector when the last owner releases it.

use parking_lot::Mutex;
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use super::collector::{Collector, CollectorSpec};
use crate::error::{MetricsError, MetricsResult};

/// Owner label pairs identifying which surface holds a share of a collector.
pub(crate) type OwnerKey = Vec<(String, String)>;

struct Registration {
    collector: Collector,
    keys: Vec<String>,
    owners: Vec<OwnerKey>,
}

/// Shared registry of label-aware collectors.
pub struct MetricRegistry {
    inner: Registry,
    collectors: Mutex<HashMap<String, Registration>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::from_registry(Registry::new())
    }

    /// Create a registry with a name prefix and static labels applied to
    /// every exported sample.
    pub fn with_labels(
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> MetricsResult<Self> {
        let labels = (!labels.is_empty()).then(|| {
            labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>()
        });
        let registry = Registry::new_custom(namespace.map(str::to_string), labels)?;
        Ok(Self::from_registry(registry))
    }

    /// Wrap an existing prometheus registry.
    pub fn from_registry(inner: Registry) -> Self {
        Self {
            inner,
            collectors: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying prometheus registry, for exporters.
    pub fn prometheus(&self) -> &Registry {
        &self.inner
    }

    /// Take a share of the collector named `spec.name`, creating and
    /// registering it if this is the first share.
    pub(crate) fn acquire(&self, spec: &CollectorSpec<'_>, owner: &[(String, String)]) -> MetricsResult<Collector> {
        let mut collectors = self.collectors.lock();

        if let Some(reg) = collectors.get_mut(spec.name) {
            if reg.collector.kind() != spec.kind || reg.keys != spec.keys {
                warn!(name = spec.name, existing = %reg.collector.kind(), requested = %spec.kind, "metric shape conflict");
                return Err(MetricsError::ShapeConflict {
                    name: spec.name.to_string(),
                    existing: reg.collector.kind(),
                    existing_keys: reg.keys.clone(),
                    requested: spec.kind,
                    requested_keys: spec.keys.to_vec(),
                });
            }
            reg.owners.push(owner.to_vec());
            return Ok(reg.collector.clone());
        }

        let collector = Collector::build(spec)?;
        self.inner.register(collector.boxed())?;
        debug!(name = spec.name, kind = %spec.kind, labels = ?spec.keys, "registered collector");

        collectors.insert(
            spec.name.to_string(),
            Registration {
                collector: collector.clone(),
                keys: spec.keys.to_vec(),
                owners: vec![owner.to_vec()],
            },
        );
        Ok(collector)
    }

    /// Give back one share of `name` held by `owner`.
    ///
    /// The last share unregisters the collector. Otherwise, if no remaining
    /// share carries the same owner labels, the children labelled with
    /// `owner`'s values are removed so a closed surface leaves no samples.
    pub(crate) fn release(&self, name: &str, owner: &[(String, String)]) {
        let mut collectors = self.collectors.lock();
        let Some(reg) = collectors.get_mut(name) else {
            return;
        };

        if let Some(pos) = reg.owners.iter().position(|o| o.as_slice() == owner) {
            reg.owners.swap_remove(pos);
        }

        if reg.owners.is_empty() {
            if let Some(reg) = collectors.remove(name) {
                if let Err(e) = self.inner.unregister(reg.collector.boxed()) {
                    warn!(name, error = %e, "failed to unregister collector");
                }
                debug!(name, "unregistered collector");
            }
        } else if !reg.owners.iter().any(|o| o.as_slice() == owner) {
            let pruned = reg.collector.prune(&reg.keys, owner);
            debug!(name, pruned, remaining_owners = reg.owners.len(), "released collector share");
        }
    }

    /// Whether a collector is currently registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.collectors.lock().contains_key(name)
    }

    /// Number of shares held on `name`.
    pub fn owners(&self, name: &str) -> usize {
        self.collectors
            .lock()
            .get(name)
            .map_or(0, |reg| reg.owners.len())
    }

    /// Number of registered collectors.
    pub fn len(&self) -> usize {
        self.collectors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregister every collector regardless of outstanding shares.
    pub fn shutdown(&self) {
        let drained: Vec<(String, Registration)> = self.collectors.lock().drain().collect();
        for (name, reg) in drained {
            if let Err(e) = self.inner.unregister(reg.collector.boxed()) {
                warn!(name = %name, error = %e, "failed to unregister collector during shutdown");
            }
        }
        debug!("registry shut down");
    }

    /// Gather all metrics and encode them in Prometheus text format.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            return String::new();
        }
        match String::from_utf8(buffer) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
                String::new()
            }
        }
    }
}

/// Named registries shared between independently constructed facades.
///
/// This is explicit, injected state: a process that wants several facades to
/// report into one registry hands them the same directory.
#[derive(Default)]
pub struct RegistryDirectory {
    entries: Mutex<HashMap<String, Arc<MetricRegistry>>>,
}

impl RegistryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `name`, creating it with `create` if absent.
    ///
    /// The boolean is true when this call created the registry.
    pub fn get_or_create<F>(&self, name: &str, create: F) -> MetricsResult<(Arc<MetricRegistry>, bool)>
    where
        F: FnOnce() -> MetricsResult<MetricRegistry>,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(name) {
            return Ok((Arc::clone(existing), false));
        }
        let registry = Arc::new(create()?);
        entries.insert(name.to_string(), Arc::clone(&registry));
        Ok((registry, true))
    }

    pub fn get(&self, name: &str) -> Option<Arc<MetricRegistry>> {
        self.entries.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<MetricRegistry>> {
        self.entries.lock().remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CollectorKind;

    fn spec<'a>(name: &'a str, kind: CollectorKind, keys: &'a [String]) -> CollectorSpec<'a> {
        CollectorSpec {
            name,
            help: "test",
            kind,
            keys,
            buckets: None,
        }
    }

    fn owner(local: &str) -> OwnerKey {
        vec![("local".to_string(), local.to_string())]
    }

    #[test]
    fn test_shared_name_counts_owners() {
        let registry = MetricRegistry::new();
        let keys = vec!["local".to_string(), "remote".to_string()];
        let s = spec("net_servers_connections", CollectorKind::Gauge, &keys);

        registry.acquire(&s, &owner("a:1")).unwrap();
        registry.acquire(&s, &owner("b:2")).unwrap();
        assert_eq!(registry.owners("net_servers_connections"), 2);

        registry.release("net_servers_connections", &owner("a:1"));
        assert!(registry.contains("net_servers_connections"));
        registry.release("net_servers_connections", &owner("b:2"));
        assert!(!registry.contains("net_servers_connections"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_shape_conflict() {
        let registry = MetricRegistry::new();
        let keys = vec!["remote".to_string()];
        registry
            .acquire(&spec("x_total", CollectorKind::Counter, &keys), &[])
            .unwrap();
        let err = registry
            .acquire(&spec("x_total", CollectorKind::Gauge, &keys), &[])
            .unwrap_err();
        assert_eq!(err.error_code(), "shape_conflict");
    }

    #[test]
    fn test_static_labels_exported() {
        let mut labels = BTreeMap::new();
        labels.insert("region".to_string(), "eu".to_string());
        let registry = MetricRegistry::with_labels(Some("app"), &labels).unwrap();
        let keys: Vec<String> = vec![];
        let collector = registry
            .acquire(&spec("up", CollectorKind::Gauge, &keys), &[])
            .unwrap();
        if let Collector::Gauge(g) = collector {
            g.with_label_values(&[]).set(1);
        }
        let text = registry.gather_text();
        assert!(text.contains("app_up{region=\"eu\"} 1"));
    }

    #[test]
    fn test_shutdown_unregisters_everything() {
        let registry = MetricRegistry::new();
        let keys: Vec<String> = vec![];
        registry
            .acquire(&spec("a", CollectorKind::Counter, &keys), &[])
            .unwrap();
        registry
            .acquire(&spec("b", CollectorKind::Gauge, &keys), &[])
            .unwrap();
        registry.shutdown();
        assert!(registry.is_empty());
        assert!(registry.prometheus().gather().is_empty());
    }

    #[test]
    fn test_directory_creates_once() {
        let directory = RegistryDirectory::new();
        let (first, created) = directory
            .get_or_create("shared", || Ok(MetricRegistry::new()))
            .unwrap();
        assert!(created);
        let (second, created) = directory
            .get_or_create("shared", || Ok(MetricRegistry::new()))
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(directory.remove("shared").is_some());
        assert!(directory.is_empty());
    }
}
