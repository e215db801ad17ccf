//! Event-bus metrics: handlers, pending messages, processing time and
//! message flow per address.

use parking_lot::Mutex;
use prometheus::{Histogram, HistogramVec, IntCounterVec, IntGaugeVec};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use super::labels::LabelComposer;
use super::registry::MetricRegistry;
use super::snapshot::Snapshot;
use super::surface::{BYTE_BUCKETS, MetricSurface, Surface};
use super::timer::OpenTimer;
use crate::config::UriFilter;
use crate::error::MetricsResult;

const LOCAL: &str = "local";
const REMOTE: &str = "remote";

fn origin(local: bool) -> &'static str {
    if local { LOCAL } else { REMOTE }
}

/// Why a reply never arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyFailure {
    Timeout,
    NoHandlers,
    RecipientFailure,
}

impl ReplyFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::NoHandlers => "NO_HANDLERS",
            Self::RecipientFailure => "RECIPIENT_FAILURE",
        }
    }
}

impl fmt::Display for ReplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered handler and its stack of in-flight dispatches.
///
/// A handler may dispatch re-entrantly, so open timers are kept on a stack:
/// each begin pushes, each end pops the most recent.
pub struct HandlerHandle {
    address: String,
    process_time: Option<Histogram>,
    timers: Mutex<Vec<OpenTimer>>,
}

impl HandlerHandle {
    /// Address label this handler records under.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dispatches begun and not yet ended.
    pub fn in_flight(&self) -> usize {
        self.timers.lock().len()
    }

    fn push(&self) {
        let timer = OpenTimer::start(self.process_time.as_ref());
        self.timers.lock().push(timer);
    }

    fn pop(&self) -> Option<f64> {
        let timer = self.timers.lock().pop();
        timer.and_then(OpenTimer::observe)
    }
}

impl fmt::Debug for HandlerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerHandle")
            .field("address", &self.address)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

pub struct EventBusSurface {
    surface: MetricSurface,
    addresses: Arc<UriFilter>,
    handlers: IntGaugeVec,
    pending: IntGaugeVec,
    process_time: HistogramVec,
    process_failures: IntCounterVec,
    messages: IntCounterVec,
    reply_failures: IntCounterVec,
    message_bytes: HistogramVec,
}

impl EventBusSurface {
    pub fn new(
        registry: Arc<MetricRegistry>,
        base_name: &str,
        labels: LabelComposer,
        addresses: Arc<UriFilter>,
    ) -> MetricsResult<Self> {
        let surface = MetricSurface::new(registry, base_name, labels);
        Ok(Self {
            handlers: surface.gauge("handlers", "Registered handlers", &["address"])?,
            pending: surface.gauge("pending", "Messages scheduled and not yet handled", &["address", "origin"])?,
            process_time: surface.histogram("process_time", "Handler processing time in seconds", &["address"])?,
            process_failures: surface.counter("process_failures", "Handler failures", &["address"])?,
            messages: surface.counter("messages", "Messages by status and origin", &["address", "status", "origin"])?,
            reply_failures: surface.counter("reply_failures", "Reply failures by kind", &["address", "failure"])?,
            message_bytes: surface.histogram_with_buckets(
                "message_bytes",
                "Encoded message size in bytes",
                &["address", "direction"],
                Some(BYTE_BUCKETS),
            )?,
            surface,
            addresses,
        })
    }

    fn address<'a>(&'a self, address: &'a str) -> &'a str {
        self.addresses.label(address)
    }

    pub fn handler_registered(&self, address: &str) -> HandlerHandle {
        let address = self.address(address);
        let process_time = if self.is_closed() {
            None
        } else {
            if let Some(g) = self.surface.bound(&self.handlers, &[address]) {
                g.inc();
            }
            self.surface.bound(&self.process_time, &[address])
        };
        HandlerHandle {
            address: address.to_string(),
            process_time,
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Dispatches still open on the handler are dropped unrecorded.
    pub fn handler_unregistered(&self, handler: HandlerHandle) {
        if self.is_closed() {
            return;
        }
        if let Some(g) = self.surface.bound(&self.handlers, &[handler.address.as_str()]) {
            g.dec();
        }
    }

    pub fn schedule_message(&self, handler: &HandlerHandle, local: bool) {
        if self.is_closed() {
            return;
        }
        if let Some(g) = self.surface.bound(&self.pending, &[handler.address.as_str(), origin(local)]) {
            g.inc();
        }
    }

    pub fn begin_handle(&self, handler: &HandlerHandle, local: bool) {
        if self.is_closed() {
            return;
        }
        if let Some(g) = self.surface.bound(&self.pending, &[handler.address.as_str(), origin(local)]) {
            g.dec();
        }
        handler.push();
    }

    /// Resolve the most recent open dispatch of `handler`.
    pub fn end_handle(&self, handler: &HandlerHandle, failure: Option<&dyn Error>) {
        if self.is_closed() {
            return;
        }
        handler.pop();
        if let Some(err) = failure {
            tracing::trace!(address = %handler.address, error = %err, "handler failed");
            if let Some(c) = self.surface.bound(&self.process_failures, &[handler.address.as_str()]) {
                c.inc();
            }
        }
    }

    fn count_message(&self, address: &str, status: &str, local: bool) {
        if let Some(c) = self.surface.bound(&self.messages, &[address, status, origin(local)]) {
            c.inc();
        }
    }

    pub fn message_sent(&self, address: &str, publish: bool, local: bool) {
        if self.is_closed() {
            return;
        }
        let status = if publish { "published" } else { "sent" };
        self.count_message(self.address(address), status, local);
    }

    /// `handlers` is the number of handlers the message was dispatched to.
    pub fn message_received(&self, address: &str, local: bool, handlers: usize) {
        if self.is_closed() {
            return;
        }
        let address = self.address(address);
        self.count_message(address, "received", local);
        if handlers > 0 {
            self.count_message(address, "delivered", local);
        }
    }

    pub fn reply_failure(&self, address: &str, failure: ReplyFailure) {
        if self.is_closed() {
            return;
        }
        let address = self.address(address);
        if let Some(c) = self.surface.bound(&self.reply_failures, &[address, failure.as_str()]) {
            c.inc();
        }
    }

    fn observe_bytes(&self, address: &str, direction: &str, bytes: usize) {
        if self.is_closed() {
            return;
        }
        let address = self.address(address);
        if let Some(h) = self.surface.bound(&self.message_bytes, &[address, direction]) {
            h.observe(bytes as f64);
        }
    }

    pub fn message_written(&self, address: &str, bytes: usize) {
        self.observe_bytes(address, "out", bytes);
    }

    pub fn message_read(&self, address: &str, bytes: usize) {
        self.observe_bytes(address, "in", bytes);
    }
}

impl Surface for EventBusSurface {
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
