use ::metrics::{counter, histogram, Counter, Histogram};
use std::time::Duration;

/// Build counters and histograms.
///
/// Handles are resolved against the globally installed recorder when the
/// struct is created; without a recorder every call is a no-op.
#[derive(Clone)]
pub struct Metrics {
    pub captures: Counter,
    pub capture_failures: Counter,
    pub capture_duration: Histogram,
    pub cache_hits: Counter,
    pub status_warnings: Counter,
    pub documents: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            captures: counter!("docshot_captures_total"),
            capture_failures: counter!("docshot_capture_failures_total"),
            capture_duration: histogram!("docshot_capture_duration_seconds"),
            cache_hits: counter!("docshot_cache_hits_total"),
            status_warnings: counter!("docshot_status_warnings_total"),
            documents: counter!("docshot_documents_total"),
        }
    }

    pub fn record_capture(&self, duration: Duration, success: bool) {
        if success {
            self.captures.increment(1);
            self.capture_duration.record(duration.as_secs_f64());
        } else {
            self.capture_failures.increment(1);
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.increment(1);
    }

    pub fn record_status_warning(&self) {
        self.status_warnings.increment(1);
    }

    pub fn record_document(&self) {
        self.documents.increment(1);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
