//! Open timers bridging a begin event to its end event.

use prometheus::{Histogram, HistogramTimer};
use std::fmt;

/// A running timer bound to one histogram child.
///
/// Resolving consumes the timer, so a handle can never observe twice. A
/// timer dropped without being resolved records nothing.
#[must_use = "an open timer records nothing until it is observed"]
pub struct OpenTimer {
    inner: Option<HistogramTimer>,
}

impl OpenTimer {
    pub(crate) fn start(histogram: Option<&Histogram>) -> Self {
        Self {
            inner: histogram.map(Histogram::start_timer),
        }
    }

    /// A timer that was never started. Resolving it is a no-op.
    pub fn inert() -> Self {
        Self { inner: None }
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_some()
    }

    /// Record the elapsed time. Returns the observed seconds, if any.
    pub fn observe(mut self) -> Option<f64> {
        self.inner.take().map(HistogramTimer::stop_and_record)
    }

    /// Stop without recording.
    pub fn discard(mut self) {
        if let Some(timer) = self.inner.take() {
            timer.stop_and_discard();
        }
    }
}

impl Drop for OpenTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.take() {
            timer.stop_and_discard();
        }
    }
}

impl fmt::Debug for OpenTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenTimer")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::HistogramOpts;

    fn histogram() -> Histogram {
        Histogram::with_opts(HistogramOpts::new("timer_test", "timer test")).unwrap()
    }

    #[test]
    fn test_observe_records_once() {
        let h = histogram();
        let timer = OpenTimer::start(Some(&h));
        assert!(timer.is_running());
        assert!(timer.observe().is_some());
        assert_eq!(h.get_sample_count(), 1);
    }

    #[test]
    fn test_discard_and_drop_record_nothing() {
        let h = histogram();
        OpenTimer::start(Some(&h)).discard();
        drop(OpenTimer::start(Some(&h)));
        assert_eq!(h.get_sample_count(), 0);
    }

    #[test]
    fn test_inert_timer() {
        let timer = OpenTimer::inert();
        assert!(!timer.is_running());
        assert_eq!(timer.observe(), None);
    }
}
