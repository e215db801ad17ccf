//! HTTP client metrics shared between clients with the same name.
//!
//! Every HTTP client created with the same name reports into one
//! [`SharedClientSurface`]. Each client attaches with its configured maximum
//! pool size and detaches with the same amount when it closes; the shared
//! surface is torn down when the last client detaches.

use parking_lot::Mutex;
use prometheus::IntGauge;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

use super::connection::{ConnectionMetrics, ConnectionSurface, RequestHandle};
use super::endpoint::{EndpointCollectors, EndpointHandle, EndpointState};
use super::snapshot::Snapshot;
use super::surface::Surface;
use super::timer::OpenTimer;
use crate::error::MetricsResult;

/// A connection surface plus endpoint collectors and an aggregate
/// `connections_max_pool_size` gauge, shared by every client of one name.
pub struct SharedClientSurface {
    id: String,
    connection: ConnectionSurface,
    endpoints: EndpointCollectors,
    max_pool_size: Option<IntGauge>,
    sharers: AtomicUsize,
}

impl SharedClientSurface {
    pub fn new(id: impl Into<String>, connection: ConnectionSurface) -> MetricsResult<Self> {
        let surface = connection.surface();
        let endpoints = EndpointCollectors::new(surface)?;
        let gauge = surface.gauge(
            "connections_max_pool_size",
            "Sum of the maximum pool sizes of attached clients",
            &[],
        )?;
        let max_pool_size = surface.bound(&gauge, &[]);
        Ok(Self {
            id: id.into(),
            connection,
            endpoints,
            max_pool_size,
            sharers: AtomicUsize::new(0),
        })
    }

    /// Key of this surface in the shared-client table.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connection(&self) -> &ConnectionSurface {
        &self.connection
    }

    /// Current value of the aggregate pool-size gauge.
    pub fn max_pool_size(&self) -> i64 {
        self.max_pool_size.as_ref().map_or(0, IntGauge::get)
    }

    /// Number of attached clients.
    pub fn sharers(&self) -> usize {
        self.sharers.load(Ordering::Acquire)
    }

    /// Add a client's pool size to the aggregate.
    ///
    /// Callers serialize attach and detach under one lock; [`SharedClients`]
    /// does this for the facade.
    pub fn attach(&self, pool_size_delta: i64) {
        if let Some(g) = &self.max_pool_size {
            g.add(pool_size_delta);
        }
        self.sharers.fetch_add(1, Ordering::AcqRel);
    }

    /// Remove a client's pool size from the aggregate. Returns true when the
    /// aggregate is exactly zero and no client remains attached.
    pub fn detach(&self, pool_size_delta: i64) -> bool {
        if let Some(g) = &self.max_pool_size {
            g.sub(pool_size_delta);
        }
        let previous = self
            .sharers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        previous <= 1 && self.max_pool_size() == 0
    }

    pub(crate) fn create_endpoint(&self, remote: String) -> EndpointHandle {
        Arc::new(EndpointState::new(self.connection.surface(), &self.endpoints, remote))
    }
}

impl Surface for SharedClientSurface {
    fn base_name(&self) -> &str {
        self.connection.base_name()
    }

    fn snapshot(&self) -> Snapshot {
        self.connection.snapshot()
    }

    fn close(&self) {
        self.connection.close();
    }

    fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}

/// The facade's table of live shared client surfaces.
///
/// One mutex guards both the table and every attach/detach, so the
/// last-sharer check and the table removal happen atomically.
#[derive(Default)]
pub struct SharedClients {
    clients: Mutex<HashMap<String, Arc<SharedClientSurface>>>,
}

impl SharedClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to the surface under `key`, building it with `create` first if
    /// no live surface exists.
    pub fn attach<F>(&self, key: &str, pool_size_delta: i64, create: F) -> MetricsResult<Arc<SharedClientSurface>>
    where
        F: FnOnce() -> MetricsResult<SharedClientSurface>,
    {
        let mut clients = self.clients.lock();
        let shared = match clients.get(key) {
            Some(existing) => Arc::clone(existing),
            None => {
                let created = Arc::new(create()?);
                clients.insert(key.to_string(), Arc::clone(&created));
                debug!(client = key, "created shared client surface");
                created
            }
        };
        shared.attach(pool_size_delta);
        Ok(shared)
    }

    /// Detach from `shared`. The last sharer removes it from the table and
    /// closes it. Returns whether this call was the last sharer.
    pub fn detach(&self, shared: &Arc<SharedClientSurface>, pool_size_delta: i64) -> bool {
        let mut clients = self.clients.lock();
        if !shared.detach(pool_size_delta) {
            return false;
        }
        if clients.get(shared.id()).is_some_and(|live| Arc::ptr_eq(live, shared)) {
            clients.remove(shared.id());
        }
        shared.close();
        debug!(client = shared.id(), "closed shared client surface");
        true
    }

    pub fn get(&self, key: &str) -> Option<Arc<SharedClientSurface>> {
        self.clients.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every surface regardless of attached clients.
    pub fn close_all(&self) {
        let mut clients = self.clients.lock();
        for (_, shared) in clients.drain() {
            shared.close();
        }
    }
}

/// Metrics handle of one HTTP client instance.
///
/// Recording goes to the shared surface of the client's name. Closing this
/// handle detaches it; the shared surface survives until its last client
/// closes.
pub struct HttpClientMetrics {
    shared: Arc<SharedClientSurface>,
    clients: Arc<SharedClients>,
    max_pool_size: i64,
    closed: AtomicBool,
}

impl HttpClientMetrics {
    pub(crate) fn new(shared: Arc<SharedClientSurface>, clients: Arc<SharedClients>, max_pool_size: i64) -> Self {
        Self {
            shared,
            clients,
            max_pool_size,
            closed: AtomicBool::new(false),
        }
    }

    pub fn shared(&self) -> &Arc<SharedClientSurface> {
        &self.shared
    }

    fn recording(&self) -> bool {
        !self.shared.is_closed()
    }

    pub fn create_endpoint(&self, host: &str, port: u16, _max_pool_size: usize) -> EndpointHandle {
        self.shared.create_endpoint(format!("{host}:{port}"))
    }

    /// The endpoint is gone; an unanswered TTFB timer is dropped.
    pub fn close_endpoint(&self, endpoint: EndpointHandle) {
        endpoint.clear_ttfb();
    }

    pub fn enqueue_request(&self, endpoint: &EndpointHandle) -> OpenTimer {
        if !self.recording() {
            return OpenTimer::inert();
        }
        endpoint.enqueue()
    }

    pub fn dequeue_request(&self, endpoint: &EndpointHandle, timer: OpenTimer) {
        if !self.recording() {
            timer.discard();
            return;
        }
        endpoint.dequeue(timer);
    }

    pub fn endpoint_connected(&self, endpoint: Option<&EndpointHandle>) {
        if let Some(ep) = endpoint.filter(|_| self.recording()) {
            ep.inc_connections();
        }
    }

    pub fn endpoint_disconnected(&self, endpoint: Option<&EndpointHandle>) {
        if let Some(ep) = endpoint.filter(|_| self.recording()) {
            ep.dec_connections();
        }
    }

    /// A request is dispatched, optionally to a pooled endpoint.
    pub fn request_begin(&self, endpoint: Option<&EndpointHandle>, method: &str, uri: &str) -> RequestHandle {
        let handle = self.shared.connection().begin_request(method, uri);
        match endpoint.filter(|_| self.recording()) {
            Some(ep) => {
                ep.inc_in_use();
                handle.with_endpoint(Arc::clone(ep), ep.start_usage())
            }
            None => handle,
        }
    }

    /// The request is fully written; time to first byte starts.
    pub fn request_end(&self, handle: &RequestHandle) {
        if let Some(ep) = handle.endpoint().filter(|_| self.recording()) {
            ep.start_ttfb();
        }
    }

    pub fn response_begin(&self, handle: &RequestHandle) {
        if let Some(ep) = handle.endpoint() {
            ep.end_ttfb();
        }
    }

    pub fn response_pushed(&self, endpoint: Option<&EndpointHandle>, method: &str, uri: &str) -> RequestHandle {
        self.request_begin(endpoint, method, uri)
    }

    /// A reset request ends without a status code.
    pub fn request_reset(&self, handle: RequestHandle) {
        self.shared.connection().end_request(handle, 0);
    }

    pub fn response_end(&self, handle: RequestHandle, status: u16) {
        self.shared.connection().end_request(handle, status);
    }

    pub fn websocket_connected(&self) {
        self.shared.connection().websocket_connected();
    }

    pub fn websocket_disconnected(&self) {
        self.shared.connection().websocket_disconnected();
    }
}

impl ConnectionMetrics for HttpClientMetrics {
    fn connected(&self, remote: Option<SocketAddr>) {
        self.shared.connection().connected(remote);
    }

    fn disconnected(&self, remote: Option<SocketAddr>) {
        self.shared.connection().disconnected(remote);
    }

    fn bytes_read(&self, remote: Option<SocketAddr>, bytes: u64) {
        self.shared.connection().bytes_read(remote, bytes);
    }

    fn bytes_written(&self, remote: Option<SocketAddr>, bytes: u64) {
        self.shared.connection().bytes_written(remote, bytes);
    }

    fn exception_occurred(&self, remote: Option<SocketAddr>, kind: &str) {
        self.shared.connection().exception_occurred(remote, kind);
    }

    fn begin_request(&self, method: &str, uri: &str) -> RequestHandle {
        self.request_begin(None, method, uri)
    }

    fn end_request(&self, handle: RequestHandle, status: u16) {
        self.response_end(handle, status);
    }
}

impl Surface for HttpClientMetrics {
    fn base_name(&self) -> &str {
        self.shared.base_name()
    }

    fn snapshot(&self) -> Snapshot {
        self.shared.snapshot()
    }

    /// Detach from the shared surface. Idempotent.
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clients.detach(&self.shared, self.max_pool_size);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for HttpClientMetrics {
    fn drop(&mut self) {
        self.close();
    }
}
