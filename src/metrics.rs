//! Monitoring sink (C7): timing/counter instrumentation, observational
//! only. Absence of a sink (the `NoopSink`) must not change pipeline
//! behavior -- see SPEC_FULL.md §4.7.

use std::{sync::Arc, time::Instant};

pub trait MetricsSink: Send + Sync {
  fn gauge(&self, name: &'static str, value: f64);
  fn incr(&self, name: &'static str);
}

/// Starts a scoped timer against `sink`; dropping the guard records the
/// elapsed wall time as a gauge under `name`. Mirrors the "scoped
/// acquisition measuring elapsed wall time on release" timer described
/// in SPEC_FULL.md §4.7.
pub fn timer(sink: Arc<dyn MetricsSink>, name: &'static str) -> ScopedTimer {
  ScopedTimer {
    sink,
    name,
    start: Instant::now(),
  }
}

pub struct ScopedTimer {
  sink: Arc<dyn MetricsSink>,
  name: &'static str,
  start: Instant,
}

impl Drop for ScopedTimer {
  fn drop(&mut self) {
    self.sink.gauge(self.name, self.start.elapsed().as_secs_f64());
  }
}

/// The default sink: does nothing. Used whenever the caller doesn't wire
/// up a real one.
pub struct NoopSink;

impl MetricsSink for NoopSink {
  fn gauge(&self, _name: &'static str, _value: f64) {}
  fn incr(&self, _name: &'static str) {}
}

/// Routes metrics through `tracing`, at `debug` level, so it costs
/// nothing when the ambient log filter excludes it -- the same way the
/// donor instruments the rest of the system rather than inventing a
/// bespoke metrics wire format.
pub struct TracingSink;

impl MetricsSink for TracingSink {
  fn gauge(&self, name: &'static str, value: f64) {
    tracing::debug!(metric = name, value, "gauge");
  }

  fn incr(&self, name: &'static str) {
    tracing::debug!(metric = name, "incr");
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::sync::Mutex;

  struct RecordingSink {
    gauges: Mutex<Vec<(&'static str, f64)>>,
  }

  impl MetricsSink for RecordingSink {
    fn gauge(&self, name: &'static str, value: f64) {
      self.gauges.lock().unwrap().push((name, value));
    }
    fn incr(&self, _name: &'static str) {}
  }

  #[test]
  fn scoped_timer_records_on_drop() {
    let sink = Arc::new(RecordingSink {
      gauges: Mutex::new(vec![]),
    });
    {
      let _t = timer(sink.clone(), "vote_time");
    }
    assert_eq!(sink.gauges.lock().unwrap().len(), 1);
    assert_eq!(sink.gauges.lock().unwrap()[0].0, "vote_time");
  }

  #[test]
  fn noop_sink_does_nothing_observable() {
    let sink = NoopSink;
    sink.gauge("x", 1.0);
    sink.incr("y");
  }
}
