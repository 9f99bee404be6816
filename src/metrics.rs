use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Request metrics
    pub static ref REQUEST_COUNTER: IntCounter = IntCounter::new(
        "gateway_requests_total",
        "Total number of graph requests received"
    ).unwrap();

    pub static ref REQUEST_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "gateway_request_duration_seconds",
            "Graph request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0])
    ).unwrap();

    pub static ref RESOLVE_FAILURES: IntCounter = IntCounter::new(
        "gateway_resolve_failures_total",
        "Total number of graph requests that failed to resolve"
    ).unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(REQUEST_COUNTER.clone())).unwrap();
    REGISTRY.register(Box::new(REQUEST_DURATION.clone())).unwrap();
    REGISTRY.register(Box::new(RESOLVE_FAILURES.clone())).unwrap();
}

pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn new() -> Self {
        REQUEST_COUNTER.inc();
        Self {
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        REQUEST_DURATION.observe(duration);
    }
}

pub fn record_resolve_failure() {
    RESOLVE_FAILURES.inc();
}
