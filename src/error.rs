//! Unified error handling for wirestat.
//!
//! Only factory paths (surface and collector creation, configuration loading)
//! can fail. Event-recording paths never return errors; they degrade to a
//! dropped sample and a `warn!` line instead.

use crate::config::ConfigError;
use crate::metrics::CollectorKind;
use thiserror::Error;

/// Errors raised while creating collectors, surfaces or facades.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// A metric name was requested with a kind or label keys that differ
    /// from the collector already registered under that name.
    #[error("metric {name} is registered as {existing} {existing_keys:?}, requested {requested} {requested_keys:?}")]
    ShapeConflict {
        name: String,
        existing: CollectorKind,
        existing_keys: Vec<String>,
        requested: CollectorKind,
        requested_keys: Vec<String>,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A surface was requested from a facade that has been closed.
    #[error("metrics facade is closed")]
    Closed,
}

impl MetricsError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Prometheus(_) => "prometheus",
            Self::ShapeConflict { .. } => "shape_conflict",
            Self::Config(_) => "config",
            Self::Closed => "closed",
        }
    }
}

/// Result type for fallible metrics construction.
pub type MetricsResult<T> = Result<T, MetricsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MetricsError::ShapeConflict {
            name: "http_servers_requests".to_string(),
            existing: CollectorKind::Histogram,
            existing_keys: vec!["method".to_string()],
            requested: CollectorKind::Counter,
            requested_keys: vec![],
        };
        assert_eq!(err.error_code(), "shape_conflict");
        assert!(err.to_string().contains("http_servers_requests"));

        let err = MetricsError::from(prometheus::Error::Msg("boom".to_string()));
        assert_eq!(err.error_code(), "prometheus");
        assert_eq!(MetricsError::Closed.error_code(), "closed");
    }
}
