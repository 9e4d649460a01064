use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{into_handler, Middleware};
use crate::handlers::Handler;
use crate::server::{Request, Response};

/// Request counters collected around the downstream chain.
///
/// Tracks request count, cumulative latency, responses per status class and
/// the coroutine stack size observed while serving. All counters are atomics
/// updated with `Ordering::Relaxed`, so reads are eventually consistent.
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    status_classes: [AtomicUsize; 5],
    stack_size: AtomicUsize,
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self {
            request_count: AtomicUsize::new(0),
            total_latency_ns: AtomicU64::new(0),
            status_classes: Default::default(),
            stack_size: AtomicUsize::new(0),
        }
    }
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// A continuation unit recording into this collector.
    pub fn handler(self: &Arc<Self>) -> Handler {
        into_handler(Arc::clone(self))
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean time spent downstream; zero before the first request.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Responses recorded with a status in `class`xx (1 to 5).
    pub fn status_count(&self, class: u16) -> usize {
        match class {
            1..=5 => self.status_classes[usize::from(class - 1)].load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// Stack size of the coroutine that served the last request.
    pub fn stack_size(&self) -> usize {
        self.stack_size.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of the counters.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# HELP webium_requests_total Requests seen by the metrics unit");
        let _ = writeln!(out, "# TYPE webium_requests_total counter");
        let _ = writeln!(out, "webium_requests_total {}", self.request_count());
        let _ = writeln!(out, "# HELP webium_responses_total Responses by status class");
        let _ = writeln!(out, "# TYPE webium_responses_total counter");
        for class in 1..=5u16 {
            let _ = writeln!(
                out,
                "webium_responses_total{{class=\"{class}xx\"}} {}",
                self.status_count(class)
            );
        }
        let _ = writeln!(out, "# HELP webium_request_latency_seconds Mean downstream latency");
        let _ = writeln!(out, "# TYPE webium_request_latency_seconds gauge");
        let _ = writeln!(
            out,
            "webium_request_latency_seconds {:.6}",
            self.average_latency().as_secs_f64()
        );
        let _ = writeln!(out, "# HELP webium_coroutine_stack_bytes Stack size of serving coroutines");
        let _ = writeln!(out, "# TYPE webium_coroutine_stack_bytes gauge");
        let _ = writeln!(out, "webium_coroutine_stack_bytes {}", self.stack_size());
        out
    }
}

impl Middleware for MetricsMiddleware {
    fn before(&self, _req: &mut Request, _res: &mut Response) -> Option<Value> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn after(&self, _req: &Request, res: &mut Response, latency: Duration) {
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        let class = res.status() / 100;
        if (1..=5).contains(&class) {
            self.status_classes[usize::from(class - 1)].fetch_add(1, Ordering::Relaxed);
        }
        // may does not expose used stack, only the configured size
        let size = if may::coroutine::is_coroutine() {
            may::coroutine::current().stack_size()
        } else {
            may::config().get_stack_size()
        };
        self.stack_size.store(size, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = MetricsMiddleware::new();
        assert_eq!(metrics.request_count(), 0);
        assert_eq!(metrics.average_latency(), Duration::from_nanos(0));
        assert_eq!(metrics.status_count(2), 0);
        assert_eq!(metrics.status_count(9), 0);
    }

    #[test]
    fn test_hooks_record_status_class() {
        let metrics = MetricsMiddleware::new();
        let mut req = Request::new(http::Method::GET, "/");
        let mut res = Response::new();
        assert!(metrics.before(&mut req, &mut res).is_none());
        res.set_status(404);
        metrics.after(&req, &mut res, Duration::from_millis(2));
        assert_eq!(metrics.request_count(), 1);
        assert_eq!(metrics.status_count(4), 1);
        assert_eq!(metrics.average_latency(), Duration::from_millis(2));
        assert!(metrics.render().contains("webium_responses_total{class=\"4xx\"} 1"));
    }
}
