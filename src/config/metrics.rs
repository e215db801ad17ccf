//! Metrics facade configuration.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::defaults::*;
use super::matching::Match;

/// Configuration consumed once at facade construction.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Master switch. A disabled facade is never built by the host.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Name of a shared registry in a [`RegistryDirectory`](crate::metrics::RegistryDirectory).
    pub registry_name: Option<String>,
    /// Prefix prepended to every exported metric name.
    pub namespace: Option<String>,
    /// Static labels attached to every exported sample.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Per-resource base name overrides.
    #[serde(default)]
    pub base_names: BaseNames,
    /// URIs recorded individually on HTTP server request metrics.
    #[serde(default)]
    pub monitored_http_server_uris: Vec<Match>,
    /// URIs recorded individually on HTTP client request metrics.
    #[serde(default)]
    pub monitored_http_client_uris: Vec<Match>,
    /// Event-bus addresses recorded individually.
    #[serde(default)]
    pub monitored_event_bus_handlers: Vec<Match>,
    /// Host runtime sizing reported by the runtime surface.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            registry_name: None,
            namespace: None,
            labels: BTreeMap::new(),
            base_names: BaseNames::default(),
            monitored_http_server_uris: Vec::new(),
            monitored_http_client_uris: Vec::new(),
            monitored_event_bus_handlers: Vec::new(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Base names of each surface namespace.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseNames {
    #[serde(default = "default_http_servers")]
    pub http_servers: String,
    #[serde(default = "default_http_clients")]
    pub http_clients: String,
    #[serde(default = "default_net_servers")]
    pub net_servers: String,
    #[serde(default = "default_net_clients")]
    pub net_clients: String,
    #[serde(default = "default_datagram")]
    pub datagram: String,
    #[serde(default = "default_eventbus")]
    pub eventbus: String,
    #[serde(default = "default_pools")]
    pub pools: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
}

impl Default for BaseNames {
    fn default() -> Self {
        Self {
            http_servers: default_http_servers(),
            http_clients: default_http_clients(),
            net_servers: default_net_servers(),
            net_clients: default_net_clients(),
            datagram: default_datagram(),
            eventbus: default_eventbus(),
            pools: default_pools(),
            runtime: default_runtime(),
        }
    }
}

impl BaseNames {
    /// All configured base names, paired with their config key.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("http_servers", self.http_servers.as_str()),
            ("http_clients", self.http_clients.as_str()),
            ("net_servers", self.net_servers.as_str()),
            ("net_clients", self.net_clients.as_str()),
            ("datagram", self.datagram.as_str()),
            ("eventbus", self.eventbus.as_str()),
            ("pools", self.pools.as_str()),
            ("runtime", self.runtime.as_str()),
        ]
        .into_iter()
    }
}

/// Host runtime sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_event_loop_pool_size")]
    pub event_loop_pool_size: usize,
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_loop_pool_size: default_event_loop_pool_size(),
            worker_pool_size: default_worker_pool_size(),
        }
    }
}
