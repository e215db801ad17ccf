//! Integration test common infrastructure.
//!
//! Builds facades over private registries and reads values back from
//! surface snapshots and the text exposition.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use wirestat::config::MetricsConfig;
use wirestat::metrics::{MetricRegistry, MetricsFacade};

/// A facade with default configuration over its own registry.
pub fn facade() -> MetricsFacade {
    MetricsFacade::new(MetricsConfig::default()).expect("Failed to build facade")
}

/// A facade reporting into `registry`.
pub fn facade_on(registry: &Arc<MetricRegistry>) -> MetricsFacade {
    MetricsFacade::with_registry(MetricsConfig::default(), Arc::clone(registry))
        .expect("Failed to build facade")
}

pub fn addr(s: &str) -> Option<SocketAddr> {
    Some(s.parse().expect("Invalid socket address"))
}

/// Lines of the text exposition that start with `prefix`.
pub fn scrape(registry: &MetricRegistry, prefix: &str) -> Vec<String> {
    registry
        .gather_text()
        .lines()
        .filter(|line| line.starts_with(prefix))
        .map(str::to_string)
        .collect()
}
