//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::matching::UriFilter;
use super::metrics::MetricsConfig;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("base_names.{key} is not a valid metric name: '{value}'")]
    InvalidBaseName { key: &'static str, value: String },
    #[error("namespace is not a valid metric name: '{0}'")]
    InvalidNamespace(String),
    #[error("static label name is not valid: '{0}'")]
    InvalidLabelName(String),
    #[error("static label name is reserved: '{0}'")]
    ReservedLabelName(String),
    #[error("static label name collides with a surface label: '{0}'")]
    ConflictingLabelName(String),
    #[error("invalid match pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Label keys declared by surfaces. A static label of the same name would
/// be exported twice on every sample.
pub const SURFACE_LABEL_KEYS: &[&str] = &[
    "local", "remote", "client", "method", "uri", "code", "name", "address", "origin", "status", "failure",
    "direction", "pool_type", "pool_name", "outcome",
];

/// Check a Prometheus metric name: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Check a Prometheus label name: `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a metrics configuration, returning all errors found.
pub fn validate(config: &MetricsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (key, value) in config.base_names.iter() {
        if !is_valid_metric_name(value) {
            errors.push(ValidationError::InvalidBaseName {
                key,
                value: value.to_string(),
            });
        }
    }

    if let Some(ns) = config.namespace.as_ref().filter(|ns| !is_valid_metric_name(ns)) {
        errors.push(ValidationError::InvalidNamespace(ns.clone()));
    }

    for name in config.labels.keys() {
        if name.starts_with("__") {
            errors.push(ValidationError::ReservedLabelName(name.clone()));
        } else if !is_valid_label_name(name) {
            errors.push(ValidationError::InvalidLabelName(name.clone()));
        } else if SURFACE_LABEL_KEYS.contains(&name.as_str()) {
            errors.push(ValidationError::ConflictingLabelName(name.clone()));
        }
    }

    for list in [
        &config.monitored_http_server_uris,
        &config.monitored_http_client_uris,
        &config.monitored_event_bus_handlers,
    ] {
        if let Err(e) = UriFilter::new(list) {
            errors.push(e);
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Match;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn test_name_rules() {
        assert!(is_valid_metric_name("http_servers"));
        assert!(is_valid_metric_name("ns:sub"));
        assert!(!is_valid_metric_name("9lives"));
        assert!(!is_valid_metric_name("queue-size"));
        assert!(!is_valid_metric_name(""));

        assert!(is_valid_label_name("pool_type"));
        assert!(!is_valid_label_name("pool:type"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = MetricsConfig::default();
        config.base_names.pools = "worker-pools".to_string();
        config.namespace = Some("1app".to_string());
        config.labels.insert("__name__".to_string(), "x".to_string());
        config.monitored_event_bus_handlers.push(Match::regex("[a-"));

        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidBaseName {
            key: "pools",
            value: "worker-pools".to_string(),
        }));
    }

    #[test]
    fn test_static_label_colliding_with_surface_key() {
        let mut config = MetricsConfig::default();
        config.labels.insert("local".to_string(), "x".to_string());
        config.labels.insert("region".to_string(), "eu".to_string());

        let errors = validate(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::ConflictingLabelName("local".to_string())]);
    }
}
