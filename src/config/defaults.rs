//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::net::SocketAddr;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Base Name Defaults
// =============================================================================

pub fn default_http_servers() -> String {
    "http_servers".to_string()
}

pub fn default_http_clients() -> String {
    "http_clients".to_string()
}

pub fn default_net_servers() -> String {
    "net_servers".to_string()
}

pub fn default_net_clients() -> String {
    "net_clients".to_string()
}

pub fn default_datagram() -> String {
    "datagram".to_string()
}

pub fn default_eventbus() -> String {
    "eventbus".to_string()
}

pub fn default_pools() -> String {
    "pools".to_string()
}

pub fn default_runtime() -> String {
    "runtime".to_string()
}

// =============================================================================
// Runtime Defaults
// =============================================================================

pub fn default_event_loop_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

pub fn default_worker_pool_size() -> usize {
    20
}

// =============================================================================
// Exporter Defaults
// =============================================================================

pub fn default_exporter_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

// =============================================================================
// Echo Defaults
// =============================================================================

pub fn default_echo_max_connections() -> usize {
    64
}
