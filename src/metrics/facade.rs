//! Top-level metrics factory handed to the host framework.
//!
//! The host asks the facade for a surface whenever it creates a server,
//! client, socket, event bus or pool, and reports runtime events (timers,
//! deployments) directly on the facade. Closing the facade closes every
//! surface it handed out and, when it owns the registry, tears that down too.

use parking_lot::Mutex;
use prometheus::{IntGauge, IntGaugeVec};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use super::client::{HttpClientMetrics, SharedClientSurface, SharedClients};
use super::connection::{ConnectionSurface, ResourceKind, address_name};
use super::eventbus::EventBusSurface;
use super::labels::LabelComposer;
use super::pool::PoolSurface;
use super::registry::{MetricRegistry, RegistryDirectory};
use super::snapshot::Snapshot;
use super::surface::{MetricSurface, Surface};
use crate::config::{ConfigError, MetricsConfig, UriFilter, validation};
use crate::error::{MetricsError, MetricsResult};

/// Client label value of unnamed clients.
pub const DEFAULT_CLIENT: &str = "default";

/// How the facade relates to its registry.
enum Ownership {
    /// Created by this facade; shut down on close.
    Exclusive,
    /// Injected by the caller; left alone on close.
    Shared,
    /// Looked up in a directory by name. The facade that created the entry
    /// shuts it down and removes it on close.
    Named {
        directory: Arc<RegistryDirectory>,
        name: String,
        created: bool,
    },
}

pub struct MetricsFacade {
    config: MetricsConfig,
    registry: Arc<MetricRegistry>,
    ownership: Ownership,
    runtime: MetricSurface,
    timers: Option<IntGauge>,
    deployments: IntGaugeVec,
    clients: Arc<SharedClients>,
    surfaces: Mutex<Vec<Weak<dyn Surface>>>,
    server_uris: Arc<UriFilter>,
    client_uris: Arc<UriFilter>,
    handler_addresses: Arc<UriFilter>,
    closed: AtomicBool,
}

fn compile(matches: &[crate::config::Match]) -> MetricsResult<Arc<UriFilter>> {
    UriFilter::new(matches)
        .map(Arc::new)
        .map_err(|e| MetricsError::Config(ConfigError::Invalid(vec![e])))
}

fn client_name(name: Option<&str>) -> &str {
    name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_CLIENT)
}

impl MetricsFacade {
    /// Build a facade over a fresh registry it owns.
    pub fn new(config: MetricsConfig) -> MetricsResult<Self> {
        validation::validate(&config).map_err(ConfigError::Invalid)?;
        let registry = MetricRegistry::with_labels(config.namespace.as_deref(), &config.labels)?;
        Self::build(config, Arc::new(registry), Ownership::Exclusive)
    }

    /// Build a facade over a caller-provided registry.
    ///
    /// The registry is not shut down on close, and the configured namespace
    /// and static labels are not applied to it.
    pub fn with_registry(config: MetricsConfig, registry: Arc<MetricRegistry>) -> MetricsResult<Self> {
        validation::validate(&config).map_err(ConfigError::Invalid)?;
        Self::build(config, registry, Ownership::Shared)
    }

    /// Build a facade whose registry is the entry `registry_name` of
    /// `directory`, creating it if absent. Without a registry name this is
    /// [`MetricsFacade::new`].
    pub fn with_directory(config: MetricsConfig, directory: Arc<RegistryDirectory>) -> MetricsResult<Self> {
        let Some(name) = config.registry_name.clone() else {
            return Self::new(config);
        };
        validation::validate(&config).map_err(ConfigError::Invalid)?;
        let (registry, created) = directory.get_or_create(&name, || {
            MetricRegistry::with_labels(config.namespace.as_deref(), &config.labels)
        })?;
        Self::build(
            config,
            registry,
            Ownership::Named {
                directory,
                name,
                created,
            },
        )
    }

    fn build(config: MetricsConfig, registry: Arc<MetricRegistry>, ownership: Ownership) -> MetricsResult<Self> {
        let runtime = MetricSurface::new(Arc::clone(&registry), config.base_names.runtime.as_str(), LabelComposer::empty());
        let timers = runtime.gauge("timers", "Active timers", &[])?;
        let deployments = runtime.gauge("deployments", "Deployed units by name", &["name"])?;
        let event_loop_size = runtime.gauge("event_loop_size", "Configured event loop threads", &[])?;
        let worker_pool_size = runtime.gauge("worker_pool_size", "Configured worker pool size", &[])?;

        let sizes = [
            (&event_loop_size, config.runtime.event_loop_pool_size),
            (&worker_pool_size, config.runtime.worker_pool_size),
        ];
        for (vec, size) in sizes {
            if let Some(g) = runtime.bound(vec, &[]) {
                g.set(i64::try_from(size).unwrap_or(i64::MAX));
            }
        }

        let facade = Self {
            server_uris: compile(&config.monitored_http_server_uris)?,
            client_uris: compile(&config.monitored_http_client_uris)?,
            handler_addresses: compile(&config.monitored_event_bus_handlers)?,
            timers: runtime.bound(&timers, &[]),
            deployments,
            runtime,
            registry,
            ownership,
            clients: Arc::new(SharedClients::new()),
            surfaces: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            config,
        };
        info!(
            registry = facade.registry_label(),
            namespace = ?facade.config.namespace,
            "metrics facade started"
        );
        Ok(facade)
    }

    fn registry_label(&self) -> &str {
        match &self.ownership {
            Ownership::Exclusive => "exclusive",
            Ownership::Shared => "shared",
            Ownership::Named { name, .. } => name,
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> MetricsResult<()> {
        if self.is_closed() {
            return Err(MetricsError::Closed);
        }
        Ok(())
    }

    fn track<S: Surface + 'static>(&self, surface: S) -> Arc<S> {
        let surface = Arc::new(surface);
        let weak: Weak<dyn Surface> = Arc::downgrade(&surface) as Weak<dyn Surface>;
        let mut surfaces = self.surfaces.lock();
        surfaces.retain(|s| s.strong_count() > 0);
        surfaces.push(weak);
        surface
    }

    fn connection(
        &self,
        kind: ResourceKind,
        base_name: &str,
        labels: LabelComposer,
        uris: &Arc<UriFilter>,
    ) -> MetricsResult<Arc<ConnectionSurface>> {
        self.ensure_open()?;
        let surface = ConnectionSurface::new(kind, Arc::clone(&self.registry), base_name, labels, Arc::clone(uris))?;
        debug!(kind = %kind, base_name, "created connection surface");
        Ok(self.track(surface))
    }

    /// Metrics of an HTTP server bound to `local`.
    pub fn create_http_server_metrics(&self, local: Option<SocketAddr>) -> MetricsResult<Arc<ConnectionSurface>> {
        self.connection(
            ResourceKind::HttpServer,
            &self.config.base_names.http_servers,
            LabelComposer::new([("local", address_name(local))]),
            &self.server_uris,
        )
    }

    /// Metrics of one HTTP client. Clients with the same name share their
    /// collectors; `max_pool_size` is added to the shared pool-size gauge
    /// until the returned handle is closed.
    pub fn create_http_client_metrics(&self, name: Option<&str>, max_pool_size: usize) -> MetricsResult<HttpClientMetrics> {
        self.ensure_open()?;
        let name = client_name(name);
        let delta = i64::try_from(max_pool_size).unwrap_or(i64::MAX);
        let shared = self.clients.attach(name, delta, || {
            let connection = ConnectionSurface::new(
                ResourceKind::HttpClient,
                Arc::clone(&self.registry),
                &self.config.base_names.http_clients,
                LabelComposer::new([("client", name)]),
                Arc::clone(&self.client_uris),
            )?;
            SharedClientSurface::new(name, connection)
        })?;
        Ok(HttpClientMetrics::new(shared, Arc::clone(&self.clients), delta))
    }

    /// The live shared surface of HTTP clients named `name`.
    pub fn shared_client(&self, name: Option<&str>) -> Option<Arc<SharedClientSurface>> {
        self.clients.get(client_name(name))
    }

    pub fn create_net_server_metrics(&self, local: Option<SocketAddr>) -> MetricsResult<Arc<ConnectionSurface>> {
        self.connection(
            ResourceKind::NetServer,
            &self.config.base_names.net_servers,
            LabelComposer::new([("local", address_name(local))]),
            &self.server_uris,
        )
    }

    pub fn create_net_client_metrics(&self, name: Option<&str>) -> MetricsResult<Arc<ConnectionSurface>> {
        self.connection(
            ResourceKind::NetClient,
            &self.config.base_names.net_clients,
            LabelComposer::new([("client", client_name(name))]),
            &self.client_uris,
        )
    }

    pub fn create_datagram_metrics(&self) -> MetricsResult<Arc<ConnectionSurface>> {
        self.connection(
            ResourceKind::Datagram,
            &self.config.base_names.datagram,
            LabelComposer::empty(),
            &self.client_uris,
        )
    }

    pub fn create_event_bus_metrics(&self) -> MetricsResult<Arc<EventBusSurface>> {
        self.ensure_open()?;
        let surface = EventBusSurface::new(
            Arc::clone(&self.registry),
            &self.config.base_names.eventbus,
            LabelComposer::empty(),
            Arc::clone(&self.handler_addresses),
        )?;
        Ok(self.track(surface))
    }

    /// Metrics of a pool. A `max_size` of 0 means unbounded: no ratio or
    /// maximum-size gauge is created.
    pub fn create_pool_metrics(&self, pool_type: &str, pool_name: &str, max_size: usize) -> MetricsResult<Arc<PoolSurface>> {
        self.ensure_open()?;
        let surface = PoolSurface::new(
            Arc::clone(&self.registry),
            &self.config.base_names.pools,
            pool_type,
            pool_name,
            max_size,
        )?;
        debug!(pool_type, pool_name, max_size, "created pool surface");
        Ok(self.track(surface))
    }

    pub fn timer_created(&self) {
        if let Some(g) = self.timers.as_ref().filter(|_| !self.is_closed()) {
            g.inc();
        }
    }

    /// A timer fired or was cancelled.
    pub fn timer_ended(&self, _cancelled: bool) {
        if let Some(g) = self.timers.as_ref().filter(|_| !self.is_closed()) {
            g.dec();
        }
    }

    pub fn deployed(&self, name: &str) {
        if self.is_closed() {
            return;
        }
        if let Some(g) = self.runtime.bound(&self.deployments, &[name]) {
            g.inc();
        }
    }

    pub fn undeployed(&self, name: &str) {
        if self.is_closed() {
            return;
        }
        if let Some(g) = self.runtime.bound(&self.deployments, &[name]) {
            g.dec();
        }
    }

    /// Snapshot of the facade's own runtime metrics.
    pub fn runtime_snapshot(&self) -> Snapshot {
        self.runtime.snapshot()
    }

    /// Number of surfaces handed out and still alive.
    pub fn live_surfaces(&self) -> usize {
        self.surfaces
            .lock()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    /// Close every surface, every shared client surface and, if owned, the
    /// registry. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let surfaces = std::mem::take(&mut *self.surfaces.lock());
        let mut closed = 0usize;
        for surface in surfaces.iter().filter_map(Weak::upgrade) {
            surface.close();
            closed += 1;
        }
        self.clients.close_all();
        self.runtime.close();

        match &self.ownership {
            Ownership::Exclusive => self.registry.shutdown(),
            Ownership::Shared => {}
            Ownership::Named {
                directory,
                name,
                created,
            } => {
                if *created {
                    self.registry.shutdown();
                    directory.remove(name);
                }
            }
        }
        info!(registry = self.registry_label(), surfaces = closed, "metrics facade closed");
    }
}

impl Drop for MetricsFacade {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::connection::ConnectionMetrics;

    #[test]
    fn test_runtime_gauges() {
        let mut config = MetricsConfig::default();
        config.runtime.event_loop_pool_size = 8;
        let facade = MetricsFacade::new(config).unwrap();
        facade.timer_created();
        facade.timer_created();
        facade.timer_ended(true);
        facade.deployed("web");
        facade.deployed("web");
        facade.undeployed("web");

        let snap = facade.runtime_snapshot();
        assert_eq!(snap["timers"].scalar(&[]), Some(1.0));
        assert_eq!(snap["deployments"].scalar(&[("name", "web")]), Some(1.0));
        assert_eq!(snap["event_loop_size"].scalar(&[]), Some(8.0));
        assert_eq!(snap["worker_pool_size"].scalar(&[]), Some(20.0));
    }

    #[test]
    fn test_unnamed_clients_share_default() {
        let facade = MetricsFacade::new(MetricsConfig::default()).unwrap();
        let a = facade.create_http_client_metrics(None, 2).unwrap();
        let b = facade.create_http_client_metrics(Some(""), 3).unwrap();
        assert!(Arc::ptr_eq(a.shared(), b.shared()));
        assert_eq!(a.shared().id(), DEFAULT_CLIENT);
        assert_eq!(a.shared().max_pool_size(), 5);
    }

    #[test]
    fn test_closed_facade_refuses_new_surfaces() {
        let facade = MetricsFacade::new(MetricsConfig::default()).unwrap();
        let server = facade.create_http_server_metrics(None).unwrap();
        facade.close();
        facade.close();
        assert!(server.is_closed());
        assert!(matches!(facade.create_event_bus_metrics(), Err(MetricsError::Closed)));
        assert!(facade.registry().is_empty());
        server.connected(None);
    }

    #[test]
    fn test_dropped_surfaces_are_forgotten() {
        let facade = MetricsFacade::new(MetricsConfig::default()).unwrap();
        let pool = facade.create_pool_metrics("worker", "w", 4).unwrap();
        let _bus = facade.create_event_bus_metrics().unwrap();
        assert_eq!(facade.live_surfaces(), 2);
        drop(pool);
        assert_eq!(facade.live_surfaces(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = MetricsConfig::default();
        config.base_names.eventbus = "event-bus".to_string();
        assert!(matches!(MetricsFacade::new(config), Err(MetricsError::Config(_))));
    }
}
