//! wirestat - label-aware Prometheus instrumentation for networked services.
//!
//! A [`MetricsFacade`] hands out one surface per resource the host creates
//! (HTTP servers and clients, TCP servers and clients, datagram sockets, the
//! event bus, worker pools). Each surface turns lifecycle events into
//! counters, gauges and histograms in a shared [`MetricRegistry`], which
//! [`http::router`] exposes for scraping.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;

pub use config::{Config, MetricsConfig};
pub use error::{MetricsError, MetricsResult};
pub use metrics::{MetricRegistry, MetricsFacade, RegistryDirectory, Surface};
