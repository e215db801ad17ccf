//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use super::defaults::{default_echo_max_connections, default_exporter_listen};
use super::metrics::MetricsConfig;
use super::validation::{self, ValidationError};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", format_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Reference host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Metrics facade configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Prometheus text endpoint. Absent means no exporter is started.
    pub exporter: Option<ExporterConfig>,
    /// Instrumented TCP echo listener used to exercise the net server surface.
    pub echo: Option<EchoConfig>,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text and validate it.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        validation::validate(&config.metrics).map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

/// Prometheus scrape endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Address the `/metrics` endpoint binds to (default: 0.0.0.0:9090).
    #[serde(default = "default_exporter_listen")]
    pub listen: SocketAddr,
}

/// Echo listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EchoConfig {
    /// Address the echo listener binds to.
    pub listen: SocketAddr,
    /// Connections served at once; further connections wait in the accept queue.
    #[serde(default = "default_echo_max_connections")]
    pub max_connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.metrics.enabled);
        assert!(config.exporter.is_none());
        assert_eq!(config.metrics.base_names.http_servers, "http_servers");
        assert_eq!(config.metrics.base_names.runtime, "runtime");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[metrics]
registry_name = "shared"
namespace = "app"

[metrics.labels]
region = "eu-west"

[[metrics.monitored_http_server_uris]]
value = "/api/.*"
type = "regex"
alias = "api"

[exporter]
listen = "127.0.0.1:9100"

[echo]
listen = "127.0.0.1:7000"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.metrics.registry_name.as_deref(), Some("shared"));
        assert_eq!(config.metrics.namespace.as_deref(), Some("app"));
        assert_eq!(config.metrics.labels.get("region").map(String::as_str), Some("eu-west"));
        assert_eq!(config.metrics.monitored_http_server_uris.len(), 1);
        assert_eq!(
            config.exporter.unwrap().listen,
            "127.0.0.1:9100".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.echo.unwrap().max_connections, 64);
    }

    #[test]
    fn test_invalid_label_rejected() {
        let err = Config::parse(
            r#"
[metrics.labels]
"bad-label" = "x"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref errors) if errors.len() == 1));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/wirestat.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
