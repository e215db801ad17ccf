//! Per-remote-endpoint state of an HTTP client.

use parking_lot::Mutex;
use prometheus::{Histogram, HistogramVec, IntGauge, IntGaugeVec};
use std::fmt;
use std::sync::Arc;

use super::surface::MetricSurface;
use super::timer::OpenTimer;
use crate::error::MetricsResult;

/// Shared handle to an endpoint's state.
pub type EndpointHandle = Arc<EndpointState>;

/// Endpoint collectors of one client surface, keyed by remote.
pub(crate) struct EndpointCollectors {
    queue_delay: HistogramVec,
    queue_size: IntGaugeVec,
    connections: IntGaugeVec,
    usage: HistogramVec,
    ttfb: HistogramVec,
    in_use: IntGaugeVec,
}

impl EndpointCollectors {
    pub(crate) fn new(surface: &MetricSurface) -> MetricsResult<Self> {
        Ok(Self {
            queue_delay: surface.histogram("queue_delay", "Time requests wait for a connection in seconds", &["remote"])?,
            queue_size: surface.gauge("queue_size", "Requests waiting for a connection", &["remote"])?,
            connections: surface.gauge("endpoint_connections", "Pooled connections per endpoint", &["remote"])?,
            usage: surface.histogram("usage", "Time a request holds a connection in seconds", &["remote"])?,
            ttfb: surface.histogram("ttfb", "Time to first response byte in seconds", &["remote"])?,
            in_use: surface.gauge("in_use", "Requests in flight per endpoint", &["remote"])?,
        })
    }
}

/// Queue, connection, usage and time-to-first-byte metrics for one remote
/// endpoint, bound to its `remote` label.
pub struct EndpointState {
    remote: String,
    queue_delay: Option<Histogram>,
    queue_size: Option<IntGauge>,
    connections: Option<IntGauge>,
    usage: Option<Histogram>,
    ttfb: Option<Histogram>,
    in_use: Option<IntGauge>,
    ttfb_timer: Mutex<Option<OpenTimer>>,
}

impl EndpointState {
    pub(crate) fn new(surface: &MetricSurface, collectors: &EndpointCollectors, remote: String) -> Self {
        let values = [remote.as_str()];
        Self {
            queue_delay: surface.bound(&collectors.queue_delay, &values),
            queue_size: surface.bound(&collectors.queue_size, &values),
            connections: surface.bound(&collectors.connections, &values),
            usage: surface.bound(&collectors.usage, &values),
            ttfb: surface.bound(&collectors.ttfb, &values),
            in_use: surface.bound(&collectors.in_use, &values),
            ttfb_timer: Mutex::new(None),
            remote,
        }
    }

    /// `host:port` of this endpoint.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// A request starts waiting for a connection.
    pub fn enqueue(&self) -> OpenTimer {
        if let Some(g) = &self.queue_size {
            g.inc();
        }
        OpenTimer::start(self.queue_delay.as_ref())
    }

    /// The request got a connection.
    pub fn dequeue(&self, timer: OpenTimer) {
        if let Some(g) = &self.queue_size {
            g.dec();
        }
        let _ = timer.observe();
    }

    /// Start waiting for the first response byte. A timer still open from an
    /// earlier request is discarded.
    pub fn start_ttfb(&self) {
        let previous = self.ttfb_timer.lock().replace(OpenTimer::start(self.ttfb.as_ref()));
        if let Some(timer) = previous {
            timer.discard();
        }
    }

    /// No-op unless a timer is open.
    pub fn end_ttfb(&self) {
        let timer = self.ttfb_timer.lock().take();
        if let Some(timer) = timer {
            let _ = timer.observe();
        }
    }

    pub(crate) fn clear_ttfb(&self) {
        let timer = self.ttfb_timer.lock().take();
        if let Some(timer) = timer {
            timer.discard();
        }
    }

    /// Usage timer for one request on this endpoint.
    pub fn start_usage(&self) -> OpenTimer {
        OpenTimer::start(self.usage.as_ref())
    }

    pub fn inc_in_use(&self) {
        if let Some(g) = &self.in_use {
            g.inc();
        }
    }

    pub fn dec_in_use(&self) {
        if let Some(g) = &self.in_use {
            g.dec();
        }
    }

    pub fn inc_connections(&self) {
        if let Some(g) = &self.connections {
            g.inc();
        }
    }

    pub fn dec_connections(&self) {
        if let Some(g) = &self.connections {
            g.dec();
        }
    }
}

impl fmt::Debug for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointState")
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}
