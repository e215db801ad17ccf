//! Worker and connection pool metrics.

use prometheus::{Histogram, IntCounterVec, IntGauge};
use std::sync::Arc;

use super::labels::LabelComposer;
use super::registry::MetricRegistry;
use super::snapshot::Snapshot;
use super::surface::{MetricSurface, Surface};
use super::timer::OpenTimer;
use crate::error::MetricsResult;

/// Queue, usage and utilization metrics of one named pool.
///
/// `pool_ratio` and `max_pool_size` exist only for pools with a positive
/// maximum size.
pub struct PoolSurface {
    surface: MetricSurface,
    queue_size: Option<IntGauge>,
    queue_delay: Option<Histogram>,
    usage: Option<Histogram>,
    in_use: Option<IntGauge>,
    completed: IntCounterVec,
    max_size: usize,
}

impl PoolSurface {
    pub fn new(
        registry: Arc<MetricRegistry>,
        base_name: &str,
        pool_type: &str,
        pool_name: &str,
        max_size: usize,
    ) -> MetricsResult<Self> {
        let labels = LabelComposer::new([("pool_type", pool_type), ("pool_name", pool_name)]);
        let surface = MetricSurface::new(registry, base_name, labels);

        let queue_size = surface.gauge("queue_size", "Tasks waiting for a worker", &[])?;
        let queue_delay = surface.histogram("queue_delay", "Time tasks wait for a worker in seconds", &[])?;
        let usage = surface.histogram("usage", "Time tasks hold a worker in seconds", &[])?;
        let in_use = surface.gauge("in_use", "Workers in use", &[])?;
        let completed = surface.counter("completed", "Finished tasks by outcome", &["outcome"])?;

        let in_use = surface.bound(&in_use, &[]);
        if max_size > 0 {
            let max = surface.gauge("max_pool_size", "Configured maximum pool size", &[])?;
            if let Some(g) = surface.bound(&max, &[]) {
                g.set(i64::try_from(max_size).unwrap_or(i64::MAX));
            }
            let ratio = surface.ratio("pool_ratio", "Workers in use over maximum pool size", &[])?;
            if let Some(numerator) = &in_use {
                let labels = surface.labels().resolve(&[]);
                ratio.track(&labels, numerator.clone(), max_size as f64);
            }
        }

        Ok(Self {
            queue_size: surface.bound(&queue_size, &[]),
            queue_delay: surface.bound(&queue_delay, &[]),
            usage: surface.bound(&usage, &[]),
            in_use,
            completed,
            max_size,
            surface,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// A task was queued.
    pub fn submitted(&self) -> OpenTimer {
        if self.is_closed() {
            return OpenTimer::inert();
        }
        if let Some(g) = &self.queue_size {
            g.inc();
        }
        OpenTimer::start(self.queue_delay.as_ref())
    }

    /// A queued task was refused; it never ran, so nothing is observed.
    pub fn rejected(&self, queued: OpenTimer) {
        queued.discard();
        if self.is_closed() {
            return;
        }
        if let Some(g) = &self.queue_size {
            g.dec();
        }
    }

    /// A queued task got a worker. Returns its usage timer.
    pub fn begin(&self, queued: OpenTimer) -> OpenTimer {
        if self.is_closed() {
            queued.discard();
            return OpenTimer::inert();
        }
        if let Some(g) = &self.queue_size {
            g.dec();
        }
        if let Some(g) = &self.in_use {
            g.inc();
        }
        let _ = queued.observe();
        OpenTimer::start(self.usage.as_ref())
    }

    /// The task finished. The usage timer is observed either way.
    pub fn end(&self, usage: OpenTimer, succeeded: bool) {
        if self.is_closed() {
            usage.discard();
            return;
        }
        if let Some(g) = &self.in_use {
            g.dec();
        }
        let _ = usage.observe();
        let outcome = if succeeded { "succeeded" } else { "failed" };
        if let Some(c) = self.surface.bound(&self.completed, &[outcome]) {
            c.inc();
        }
    }
}

impl Surface for PoolSurface {
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
