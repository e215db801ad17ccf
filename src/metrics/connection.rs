//! Connection-level metrics shared by servers, clients and datagram sockets.

use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use super::endpoint::EndpointHandle;
use super::labels::LabelComposer;
use super::registry::MetricRegistry;
use super::snapshot::Snapshot;
use super::surface::{BYTE_BUCKETS, MetricSurface, Surface};
use super::timer::OpenTimer;
use crate::config::UriFilter;
use crate::error::MetricsResult;

/// The kind of resource a connection surface instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    HttpServer,
    HttpClient,
    NetServer,
    NetClient,
    Datagram,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpServer => "http_server",
            Self::HttpClient => "http_client",
            Self::NetServer => "net_server",
            Self::NetClient => "net_client",
            Self::Datagram => "datagram",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label value for an optional socket address. Unknown peers are `?`.
pub fn address_name(address: Option<SocketAddr>) -> String {
    match address {
        Some(addr) => addr.to_string(),
        None => "?".to_string(),
    }
}

/// Events every connection-oriented resource reports.
///
/// None of these fail: after the surface is closed they are silently
/// ignored.
pub trait ConnectionMetrics: Surface {
    fn connected(&self, remote: Option<SocketAddr>);

    fn disconnected(&self, remote: Option<SocketAddr>);

    fn bytes_read(&self, remote: Option<SocketAddr>, bytes: u64);

    fn bytes_written(&self, remote: Option<SocketAddr>, bytes: u64);

    /// `kind` names the error type, e.g. `"io::ErrorKind::ConnectionReset"`.
    fn exception_occurred(&self, remote: Option<SocketAddr>, kind: &str);

    /// Start timing a request.
    fn begin_request(&self, method: &str, uri: &str) -> RequestHandle;

    /// Finish a request. A `status` of 0 records no response.
    fn end_request(&self, handle: RequestHandle, status: u16);
}

struct EndpointUsage {
    endpoint: EndpointHandle,
    usage: OpenTimer,
}

/// An in-flight request: its duration timer and, on the client side, the
/// endpoint it was dispatched to.
#[must_use = "a request handle must be passed to end_request"]
pub struct RequestHandle {
    timer: OpenTimer,
    endpoint: Option<EndpointUsage>,
}

impl RequestHandle {
    fn new(timer: OpenTimer) -> Self {
        Self {
            timer,
            endpoint: None,
        }
    }

    /// A handle that records nothing when ended.
    pub fn inert() -> Self {
        Self::new(OpenTimer::inert())
    }

    pub(crate) fn with_endpoint(mut self, endpoint: EndpointHandle, usage: OpenTimer) -> Self {
        self.endpoint = Some(EndpointUsage { endpoint, usage });
        self
    }

    pub fn endpoint(&self) -> Option<&EndpointHandle> {
        self.endpoint.as_ref().map(|e| &e.endpoint)
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Drop the handle without recording anything.
    pub fn discard(self) {
        self.timer.discard();
        if let Some(e) = self.endpoint {
            e.usage.discard();
        }
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("timer", &self.timer)
            .field("endpoint", &self.endpoint.as_ref().map(|e| e.endpoint.remote()))
            .finish()
    }
}

/// Connection, byte, exception, request and websocket metrics for one
/// server, client or socket.
pub struct ConnectionSurface {
    kind: ResourceKind,
    surface: MetricSurface,
    uris: Arc<UriFilter>,
    requests: HistogramVec,
    responses: IntCounterVec,
    connections: IntGaugeVec,
    bytes_read: HistogramVec,
    bytes_written: HistogramVec,
    exceptions: IntCounterVec,
    websockets: IntGaugeVec,
}

impl ConnectionSurface {
    pub fn new(
        kind: ResourceKind,
        registry: Arc<MetricRegistry>,
        base_name: &str,
        labels: LabelComposer,
        uris: Arc<UriFilter>,
    ) -> MetricsResult<Self> {
        let surface = MetricSurface::new(registry, base_name, labels);
        let requests = surface.histogram("requests", "Request processing time in seconds", &["method", "uri"])?;
        let responses = surface.counter("responses", "Responses sent, by status code", &["code"])?;
        let connections = surface.gauge("connections", "Open connections", &["remote"])?;
        let bytes_read = surface.histogram_with_buckets("bytes_read", "Bytes read per read event", &["remote"], Some(BYTE_BUCKETS))?;
        let bytes_written = surface.histogram_with_buckets("bytes_written", "Bytes written per write event", &["remote"], Some(BYTE_BUCKETS))?;
        let exceptions = surface.counter("exceptions", "Connection errors, by error kind", &["remote", "name"])?;
        let websockets = surface.gauge("websockets", "Open websockets", &[])?;

        Ok(Self {
            kind,
            surface,
            uris,
            requests,
            responses,
            connections,
            bytes_read,
            bytes_written,
            exceptions,
            websockets,
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn surface(&self) -> &MetricSurface {
        &self.surface
    }

    /// A server push opens a request like any other.
    pub fn response_pushed(&self, method: &str, uri: &str) -> RequestHandle {
        self.begin_request(method, uri)
    }

    /// A websocket upgrade counts as an open websocket.
    pub fn upgrade(&self) {
        self.websocket_connected();
    }

    /// The request was reset before a response; nothing is recorded.
    pub fn request_reset(&self, handle: RequestHandle) {
        handle.discard();
    }

    pub fn websocket_connected(&self) {
        if self.is_closed() {
            return;
        }
        if let Some(g) = self.surface.bound(&self.websockets, &[]) {
            g.inc();
        }
    }

    pub fn websocket_disconnected(&self) {
        if self.is_closed() {
            return;
        }
        if let Some(g) = self.surface.bound(&self.websockets, &[]) {
            g.dec();
        }
    }

    fn connection_delta(&self, remote: Option<SocketAddr>, delta: i64) {
        if self.is_closed() {
            return;
        }
        let remote = address_name(remote);
        if let Some(g) = self.surface.bound(&self.connections, &[remote.as_str()]) {
            g.add(delta);
        }
    }

    fn observe_bytes(&self, vec: &HistogramVec, remote: Option<SocketAddr>, bytes: u64) {
        if self.is_closed() {
            return;
        }
        let remote = address_name(remote);
        if let Some(h) = self.surface.bound(vec, &[remote.as_str()]) {
            h.observe(bytes as f64);
        }
    }
}

impl ConnectionMetrics for ConnectionSurface {
    fn connected(&self, remote: Option<SocketAddr>) {
        self.connection_delta(remote, 1);
    }

    fn disconnected(&self, remote: Option<SocketAddr>) {
        self.connection_delta(remote, -1);
    }

    fn bytes_read(&self, remote: Option<SocketAddr>, bytes: u64) {
        self.observe_bytes(&self.bytes_read, remote, bytes);
    }

    fn bytes_written(&self, remote: Option<SocketAddr>, bytes: u64) {
        self.observe_bytes(&self.bytes_written, remote, bytes);
    }

    fn exception_occurred(&self, remote: Option<SocketAddr>, kind: &str) {
        if self.is_closed() {
            return;
        }
        let remote = address_name(remote);
        if let Some(c) = self.surface.bound(&self.exceptions, &[remote.as_str(), kind]) {
            c.inc();
        }
    }

    fn begin_request(&self, method: &str, uri: &str) -> RequestHandle {
        if self.is_closed() {
            return RequestHandle::inert();
        }
        let uri = self.uris.label(uri);
        let child = self.surface.bound(&self.requests, &[method, uri]);
        RequestHandle::new(OpenTimer::start(child.as_ref()))
    }

    fn end_request(&self, handle: RequestHandle, status: u16) {
        if self.is_closed() {
            handle.discard();
            return;
        }
        if status > 0 {
            let code = status.to_string();
            if let Some(c) = self.surface.bound(&self.responses, &[code.as_str()]) {
                c.inc();
            }
        }
        let _ = handle.timer.observe();
        if let Some(e) = handle.endpoint {
            e.endpoint.dec_in_use();
            let _ = e.usage.observe();
        }
    }
}

impl Surface for ConnectionSurface {
    fn base_name(&self) -> &str {
        self.surface.base_name()
    }

    fn snapshot(&self) -> Snapshot {
        self.surface.snapshot()
    }

    fn close(&self) {
        self.surface.close();
    }

    fn is_closed(&self) -> bool {
        self.surface.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Match;

    fn server(registry: &Arc<MetricRegistry>, local: &str, uris: UriFilter) -> ConnectionSurface {
        ConnectionSurface::new(
            ResourceKind::HttpServer,
            Arc::clone(registry),
            "http_servers",
            LabelComposer::new([("local", local)]),
            Arc::new(uris),
        )
        .unwrap()
    }

    fn addr(s: &str) -> Option<SocketAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_address_name() {
        assert_eq!(address_name(None), "?");
        assert_eq!(address_name(addr("10.0.0.2:5000")), "10.0.0.2:5000");
    }

    #[test]
    fn test_connection_gauge_per_remote() {
        let registry = Arc::new(MetricRegistry::new());
        let s = server(&registry, "0.0.0.0:80", UriFilter::default());
        s.connected(addr("1.1.1.1:1"));
        s.connected(addr("1.1.1.1:1"));
        s.connected(addr("2.2.2.2:2"));
        s.disconnected(addr("1.1.1.1:1"));

        let snap = s.snapshot();
        let conns = &snap["connections"];
        assert_eq!(conns.scalar(&[("remote", "1.1.1.1:1")]), Some(1.0));
        assert_eq!(conns.scalar(&[("remote", "2.2.2.2:2")]), Some(1.0));
    }

    #[test]
    fn test_request_without_status_records_no_response() {
        let registry = Arc::new(MetricRegistry::new());
        let s = server(&registry, "0.0.0.0:80", UriFilter::default());
        let handle = s.begin_request("GET", "/health");
        assert!(handle.is_running());
        s.end_request(handle, 0);

        let snap = s.snapshot();
        assert!(snap["responses"].samples.is_empty());
        assert_eq!(snap["requests"].count(&[("method", "GET"), ("uri", "/health")]), Some(1));
    }

    #[test]
    fn test_uri_filter_folds_unmatched() {
        let registry = Arc::new(MetricRegistry::new());
        let filter = UriFilter::new(&[Match::regex("/users/\\d+").with_alias("/users/:id")]).unwrap();
        let s = server(&registry, "0.0.0.0:80", filter);
        s.end_request(s.begin_request("GET", "/users/42"), 200);
        s.end_request(s.begin_request("GET", "/other"), 404);

        let snap = s.snapshot();
        let requests = &snap["requests"];
        assert_eq!(requests.count(&[("uri", "/users/:id")]), Some(1));
        assert_eq!(requests.count(&[("uri", UriFilter::OTHER)]), Some(1));
    }

    #[test]
    fn test_closed_surface_ignores_events() {
        let registry = Arc::new(MetricRegistry::new());
        let s = server(&registry, "0.0.0.0:80", UriFilter::default());
        let handle = s.begin_request("GET", "/");
        s.close();
        s.connected(addr("1.1.1.1:1"));
        s.exception_occurred(None, "reset");
        s.end_request(handle, 200);
        assert!(!s.begin_request("GET", "/").is_running());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reset_and_upgrade() {
        let registry = Arc::new(MetricRegistry::new());
        let s = server(&registry, "0.0.0.0:80", UriFilter::default());
        let handle = s.begin_request("GET", "/ws");
        s.upgrade();
        s.request_reset(handle);

        let snap = s.snapshot();
        assert_eq!(snap["websockets"].scalar(&[]), Some(1.0));
        assert_eq!(snap["requests"].count(&[("uri", "/ws")]), Some(0));
    }

    #[test]
    fn test_two_servers_share_collectors() {
        let registry = Arc::new(MetricRegistry::new());
        let a = server(&registry, "0.0.0.0:80", UriFilter::default());
        let b = server(&registry, "0.0.0.0:81", UriFilter::default());
        a.connected(addr("1.1.1.1:1"));
        b.connected(addr("1.1.1.1:1"));
        assert_eq!(registry.owners("http_servers_connections"), 2);

        a.close();
        assert!(registry.contains("http_servers_connections"));
        let snap = b.snapshot();
        let conns = &snap["connections"];
        assert_eq!(conns.samples.len(), 1);
        assert_eq!(conns.scalar(&[("local", "0.0.0.0:81")]), Some(1.0));
    }
}
