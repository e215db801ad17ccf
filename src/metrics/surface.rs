//! Named, label-aware metric namespaces.
//!
//! A [`MetricSurface`] owns the collectors of one logical namespace such as
//! `http_servers` or `eventbus`. Every concrete surface in this crate is a
//! thin struct over a `MetricSurface` plus the collectors it created.

use prometheus::core::{MetricVec, MetricVecBuilder};
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use super::collector::{Collector, CollectorKind, CollectorSpec, RatioGauge};
use super::labels::LabelComposer;
use super::registry::MetricRegistry;
use super::snapshot::{MetricSnapshot, Snapshot};
use super::table::CollectorTable;
use crate::error::{MetricsError, MetricsResult};

/// Buckets for byte-count histograms: 64 B to 16 MiB.
pub const BYTE_BUCKETS: &[f64] = &[
    64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0, 4194304.0, 16777216.0,
];

/// Common lifecycle of every surface handed to the host framework.
pub trait Surface: Send + Sync {
    /// Namespace prefix of every metric this surface owns.
    fn base_name(&self) -> &str;

    /// Snapshot of this surface's collectors keyed by short name.
    fn snapshot(&self) -> Snapshot;

    /// Release every collector. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

pub struct MetricSurface {
    base_name: String,
    labels: LabelComposer,
    table: CollectorTable,
    closed: AtomicBool,
}

impl MetricSurface {
    pub fn new(registry: Arc<MetricRegistry>, base_name: impl Into<String>, labels: LabelComposer) -> Self {
        let table = CollectorTable::new(registry, labels.owner());
        Self {
            base_name: base_name.into(),
            labels,
            table,
            closed: AtomicBool::new(false),
        }
    }

    pub fn labels(&self) -> &LabelComposer {
        &self.labels
    }

    pub fn table(&self) -> &CollectorTable {
        &self.table
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        self.table.registry()
    }

    /// `base_name + "_" + name`.
    pub fn full_name(&self, name: &str) -> String {
        format!("{}_{}", self.base_name, name)
    }

    fn collector(
        &self,
        name: &str,
        help: &str,
        kind: CollectorKind,
        keys: &[&str],
        buckets: Option<&[f64]>,
    ) -> MetricsResult<Collector> {
        let full_name = self.full_name(name);
        let keys = self.labels.keys(keys);
        self.table.get_or_create(&CollectorSpec {
            name: &full_name,
            help,
            kind,
            keys: &keys,
            buckets,
        })
    }

    fn conflict(&self, name: &str, found: &Collector, requested: CollectorKind) -> MetricsError {
        MetricsError::ShapeConflict {
            name: self.full_name(name),
            existing: found.kind(),
            existing_keys: Vec::new(),
            requested,
            requested_keys: Vec::new(),
        }
    }

    pub fn counter(&self, name: &str, help: &str, keys: &[&str]) -> MetricsResult<IntCounterVec> {
        match self.collector(name, help, CollectorKind::Counter, keys, None)? {
            Collector::Counter(c) => Ok(c),
            other => Err(self.conflict(name, &other, CollectorKind::Counter)),
        }
    }

    pub fn gauge(&self, name: &str, help: &str, keys: &[&str]) -> MetricsResult<IntGaugeVec> {
        match self.collector(name, help, CollectorKind::Gauge, keys, None)? {
            Collector::Gauge(g) => Ok(g),
            other => Err(self.conflict(name, &other, CollectorKind::Gauge)),
        }
    }

    /// Histogram with the default latency buckets (seconds).
    pub fn histogram(&self, name: &str, help: &str, keys: &[&str]) -> MetricsResult<HistogramVec> {
        self.histogram_with_buckets(name, help, keys, None)
    }

    pub fn histogram_with_buckets(
        &self,
        name: &str,
        help: &str,
        keys: &[&str],
        buckets: Option<&[f64]>,
    ) -> MetricsResult<HistogramVec> {
        match self.collector(name, help, CollectorKind::Histogram, keys, buckets)? {
            Collector::Histogram(h) => Ok(h),
            other => Err(self.conflict(name, &other, CollectorKind::Histogram)),
        }
    }

    pub fn ratio(&self, name: &str, help: &str, keys: &[&str]) -> MetricsResult<RatioGauge> {
        match self.collector(name, help, CollectorKind::Ratio, keys, None)? {
            Collector::Ratio(r) => Ok(r),
            other => Err(self.conflict(name, &other, CollectorKind::Ratio)),
        }
    }

    /// The child of `vec` bound to this surface's owner labels followed by
    /// `values`. `None` (with a warning) if the label arity does not match.
    pub fn bound<T: MetricVecBuilder>(&self, vec: &MetricVec<T>, values: &[&str]) -> Option<T::M> {
        let all = self.labels.resolve(values);
        match vec.get_metric_with_label_values(&all) {
            Ok(metric) => Some(metric),
            Err(e) => {
                warn!(surface = %self.base_name, labels = ?all.as_slice(), error = %e, "dropping sample");
                None
            }
        }
    }

    /// Forget a single collector by short name.
    pub fn remove(&self, name: &str) {
        self.table.remove(&self.full_name(name));
    }

    /// Snapshot of the collectors whose full name starts with `prefix`.
    ///
    /// Keys are the names with this surface's base name stripped.
    pub fn snapshot_prefix(&self, prefix: &str) -> Snapshot {
        let base = format!("{}_", self.base_name);
        self.table
            .with_prefix(prefix)
            .into_iter()
            .map(|(name, collector)| {
                let short = name
                    .strip_prefix(base.as_str())
                    .map_or_else(|| name.clone(), str::to_string);
                (short, MetricSnapshot::capture(&collector))
            })
            .collect()
    }
}

impl Surface for MetricSurface {
    fn base_name(&self) -> &str {
        &self.base_name
    }

    fn snapshot(&self) -> Snapshot {
        self.snapshot_prefix(&self.base_name)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.table.remove_all();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for MetricSurface {
    fn drop(&mut self) {
        self.close();
    }
}
