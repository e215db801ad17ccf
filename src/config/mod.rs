//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level config file (Config, ExporterConfig, EchoConfig)
//! - [`metrics`]: Facade configuration (MetricsConfig, BaseNames, RuntimeConfig)
//! - [`matching`]: Monitored-value filters (Match, MatchType, UriFilter)
//! - [`validation`]: Startup validation of identifiers and patterns

mod defaults;
mod matching;
mod metrics;
mod types;
pub mod validation;

pub use matching::{Match, MatchType, UriFilter};
pub use metrics::{BaseNames, MetricsConfig, RuntimeConfig};
pub use types::{Config, ConfigError, EchoConfig, ExporterConfig};
pub use validation::ValidationError;
