//! Read-only snapshots of surface collectors.

use serde::Serialize;
use std::collections::BTreeMap;

use super::collector::{Collector, CollectorKind};

/// Short metric name -> snapshot of that collector.
pub type Snapshot = BTreeMap<String, MetricSnapshot>;

/// Current value of one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SampleValue {
    Scalar(f64),
    Distribution { count: u64, sum: f64 },
}

impl SampleValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Distribution { .. } => None,
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Distribution { count, .. } => Some(*count),
            Self::Scalar(_) => None,
        }
    }
}

/// One label-bound child of a collector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: SampleValue,
}

/// All children of one collector at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub kind: CollectorKind,
    pub samples: Vec<Sample>,
}

impl MetricSnapshot {
    pub(crate) fn capture(collector: &Collector) -> Self {
        let kind = collector.kind();
        let mut samples = Vec::new();
        for family in collector.collect() {
            for metric in family.get_metric() {
                let labels = metric
                    .get_label()
                    .iter()
                    .map(|lp| (lp.get_name().to_string(), lp.get_value().to_string()))
                    .collect();
                let value = match kind {
                    CollectorKind::Counter => SampleValue::Scalar(metric.get_counter().get_value()),
                    CollectorKind::Gauge | CollectorKind::Ratio => {
                        SampleValue::Scalar(metric.get_gauge().get_value())
                    }
                    CollectorKind::Histogram => {
                        let h = metric.get_histogram();
                        SampleValue::Distribution {
                            count: h.get_sample_count(),
                            sum: h.get_sample_sum(),
                        }
                    }
                };
                samples.push(Sample { labels, value });
            }
        }
        Self { kind, samples }
    }

    /// First sample whose labels include every `(key, value)` in `labels`.
    pub fn find(&self, labels: &[(&str, &str)]) -> Option<&SampleValue> {
        self.samples
            .iter()
            .find(|s| {
                labels
                    .iter()
                    .all(|(k, v)| s.labels.get(*k).is_some_and(|actual| actual == v))
            })
            .map(|s| &s.value)
    }

    /// Scalar value of the sample matching `labels`.
    pub fn scalar(&self, labels: &[(&str, &str)]) -> Option<f64> {
        self.find(labels).and_then(SampleValue::as_scalar)
    }

    /// Observation count of the histogram sample matching `labels`.
    pub fn count(&self, labels: &[(&str, &str)]) -> Option<u64> {
        self.find(labels).and_then(SampleValue::count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::collector::CollectorSpec;

    #[test]
    fn test_capture_histogram() {
        let keys = vec!["method".to_string()];
        let collector = Collector::build(&CollectorSpec {
            name: "snap_requests",
            help: "test",
            kind: CollectorKind::Histogram,
            keys: &keys,
            buckets: None,
        })
        .unwrap();
        let Collector::Histogram(h) = &collector else {
            panic!("expected histogram");
        };
        h.with_label_values(&["GET"]).observe(0.5);
        h.with_label_values(&["GET"]).observe(0.25);

        let snap = MetricSnapshot::capture(&collector);
        assert_eq!(snap.kind, CollectorKind::Histogram);
        assert_eq!(snap.count(&[("method", "GET")]), Some(2));
        assert_eq!(
            snap.find(&[("method", "GET")]),
            Some(&SampleValue::Distribution { count: 2, sum: 0.75 })
        );
        assert_eq!(snap.find(&[("method", "POST")]), None);
    }

    #[test]
    fn test_serializes_to_json() {
        let snap = MetricSnapshot {
            kind: CollectorKind::Gauge,
            samples: vec![Sample {
                labels: BTreeMap::from([("remote".to_string(), "a:1".to_string())]),
                value: SampleValue::Scalar(2.0),
            }],
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["kind"], "gauge");
        assert_eq!(json["samples"][0]["value"], 2.0);
        assert_eq!(json["samples"][0]["labels"]["remote"], "a:1");
    }
}
