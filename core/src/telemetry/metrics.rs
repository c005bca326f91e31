use std::sync::Mutex;

/// Counters for rendered frames, drawn boxes and discarded responses.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_rendered: usize,
    pub boxes_drawn: usize,
    pub stale_responses: usize,
    pub failures: usize,
}

#[derive(Default)]
struct Metrics {
    frames_rendered: usize,
    boxes_drawn: usize,
    stale_responses: usize,
    failures: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_render(&self, boxes: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.frames_rendered += 1;
            metrics.boxes_drawn += boxes;
        }
    }

    pub fn record_stale(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.stale_responses += 1;
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.failures += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            MetricsSnapshot {
                frames_rendered: metrics.frames_rendered,
                boxes_drawn: metrics.boxes_drawn,
                stale_responses: metrics.stale_responses,
                failures: metrics.failures,
            }
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
