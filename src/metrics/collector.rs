//! Collector variants owned by a [`CollectorTable`](super::CollectorTable).
//!
//! Counters and gauges are integer-valued; histograms observe seconds or
//! bytes. [`RatioGauge`] is a derived gauge whose value is recomputed from
//! tracked numerator gauges every time it is collected.

use parking_lot::Mutex;
use prometheus::core::{Collector as PromCollector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The kind of a registered collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorKind {
    Counter,
    Gauge,
    Histogram,
    Ratio,
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Histogram => write!(f, "histogram"),
            Self::Ratio => write!(f, "ratio"),
        }
    }
}

/// Everything needed to build a collector.
#[derive(Debug, Clone, Copy)]
pub struct CollectorSpec<'a> {
    /// Fully-qualified metric name (base name included).
    pub name: &'a str,
    pub help: &'a str,
    pub kind: CollectorKind,
    /// Owner keys first, then call-site keys.
    pub keys: &'a [String],
    /// Histogram buckets. `None` uses the prometheus defaults.
    pub buckets: Option<&'a [f64]>,
}

/// A label-parameterized collector.
#[derive(Clone)]
pub enum Collector {
    Counter(IntCounterVec),
    Gauge(IntGaugeVec),
    Histogram(HistogramVec),
    Ratio(RatioGauge),
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Collector").field(&self.kind()).finish()
    }
}

impl Collector {
    pub(crate) fn build(spec: &CollectorSpec<'_>) -> prometheus::Result<Self> {
        let keys: Vec<&str> = spec.keys.iter().map(String::as_str).collect();
        let collector = match spec.kind {
            CollectorKind::Counter => {
                Self::Counter(IntCounterVec::new(Opts::new(spec.name, spec.help), &keys)?)
            }
            CollectorKind::Gauge => {
                Self::Gauge(IntGaugeVec::new(Opts::new(spec.name, spec.help), &keys)?)
            }
            CollectorKind::Histogram => {
                let mut opts = HistogramOpts::new(spec.name, spec.help);
                if let Some(buckets) = spec.buckets {
                    opts = opts.buckets(buckets.to_vec());
                }
                Self::Histogram(HistogramVec::new(opts, &keys)?)
            }
            CollectorKind::Ratio => {
                Self::Ratio(RatioGauge::new(Opts::new(spec.name, spec.help), &keys)?)
            }
        };
        Ok(collector)
    }

    pub fn kind(&self) -> CollectorKind {
        match self {
            Self::Counter(_) => CollectorKind::Counter,
            Self::Gauge(_) => CollectorKind::Gauge,
            Self::Histogram(_) => CollectorKind::Histogram,
            Self::Ratio(_) => CollectorKind::Ratio,
        }
    }

    /// Boxed handle for `Registry::register` / `Registry::unregister`.
    pub(crate) fn boxed(&self) -> Box<dyn PromCollector> {
        match self {
            Self::Counter(c) => Box::new(c.clone()),
            Self::Gauge(g) => Box::new(g.clone()),
            Self::Histogram(h) => Box::new(h.clone()),
            Self::Ratio(r) => Box::new(r.clone()),
        }
    }

    /// Current samples. Read-only apart from refreshing derived ratios.
    pub fn collect(&self) -> Vec<MetricFamily> {
        match self {
            Self::Counter(c) => c.collect(),
            Self::Gauge(g) => g.collect(),
            Self::Histogram(h) => h.collect(),
            Self::Ratio(r) => PromCollector::collect(r),
        }
    }

    fn remove_label_values(&self, values: &[&str]) -> bool {
        let result = match self {
            Self::Counter(c) => c.remove_label_values(values),
            Self::Gauge(g) => g.remove_label_values(values),
            Self::Histogram(h) => h.remove_label_values(values),
            Self::Ratio(r) => r.vec.remove_label_values(values),
        };
        result.is_ok()
    }

    /// Remove every child whose labels carry all of `owner`'s values.
    ///
    /// `keys` is the declared key order of this collector. Returns the
    /// number of children removed.
    pub(crate) fn prune(&self, keys: &[String], owner: &[(String, String)]) -> usize {
        if owner.is_empty() {
            return 0;
        }
        if let Self::Ratio(r) = self {
            r.untrack_owner(keys, owner);
        }

        let mut removed = 0;
        for family in self.collect() {
            for metric in family.get_metric() {
                let pairs: HashMap<&str, &str> = metric
                    .get_label()
                    .iter()
                    .map(|lp| (lp.get_name(), lp.get_value()))
                    .collect();
                let owned = owner
                    .iter()
                    .all(|(k, v)| pairs.get(k.as_str()) == Some(&v.as_str()));
                if !owned {
                    continue;
                }
                let values: Option<Vec<&str>> =
                    keys.iter().map(|k| pairs.get(k.as_str()).copied()).collect();
                if values.is_some_and(|values| self.remove_label_values(&values)) {
                    removed += 1;
                }
            }
        }
        removed
    }
}

struct RatioSource {
    labels: Vec<String>,
    numerator: IntGauge,
    denominator: f64,
}

/// Gauge reporting `numerator / denominator` for each tracked label set.
///
/// The value is recomputed on every collect, so scrapes and snapshots see
/// the live ratio without the recording path touching it.
#[derive(Clone)]
pub struct RatioGauge {
    vec: GaugeVec,
    sources: Arc<Mutex<Vec<RatioSource>>>,
}

impl RatioGauge {
    fn new(opts: Opts, keys: &[&str]) -> prometheus::Result<Self> {
        Ok(Self {
            vec: GaugeVec::new(opts, keys)?,
            sources: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Track `numerator / denominator` under `labels`.
    ///
    /// A non-positive denominator is ignored; the ratio is undefined there.
    pub fn track(&self, labels: &[&str], numerator: IntGauge, denominator: f64) {
        if denominator <= 0.0 {
            return;
        }
        let mut sources = self.sources.lock();
        sources.retain(|s| !same_labels(&s.labels, labels));
        sources.push(RatioSource {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            numerator,
            denominator,
        });
        drop(sources);
        self.refresh();
    }

    fn untrack_owner(&self, keys: &[String], owner: &[(String, String)]) {
        self.sources.lock().retain(|s| {
            !owner.iter().all(|(k, v)| {
                keys.iter()
                    .position(|key| key == k)
                    .and_then(|i| s.labels.get(i))
                    .is_some_and(|value| value == v)
            })
        });
    }

    fn refresh(&self) {
        for source in self.sources.lock().iter() {
            let values: Vec<&str> = source.labels.iter().map(String::as_str).collect();
            if let Ok(gauge) = self.vec.get_metric_with_label_values(&values) {
                gauge.set(source.numerator.get() as f64 / source.denominator);
            }
        }
    }
}

fn same_labels(stored: &[String], labels: &[&str]) -> bool {
    stored.iter().map(String::as_str).eq(labels.iter().copied())
}

impl PromCollector for RatioGauge {
    fn desc(&self) -> Vec<&Desc> {
        self.vec.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.refresh();
        self.vec.collect()
    }
}
