use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use super::Middleware;
use crate::server::{Request, Response};

/// Logs one event when a request enters the chain and one when it leaves.
///
/// Events carry the request id so lines from the same request can be joined.
/// No span is entered: coroutines may resume on another worker thread and
/// tracing's entered-span stack is thread local.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn before(&self, req: &mut Request, _res: &mut Response) -> Option<Value> {
        debug!(
            request_id = %req.id(),
            method = %req.method,
            path = %req.pathname,
            ip = %req.ip,
            "Request started"
        );
        None
    }

    fn after(&self, req: &Request, res: &mut Response, latency: Duration) {
        info!(
            request_id = %req.id(),
            method = %req.method,
            path = %req.pathname,
            status = res.status(),
            finished = res.is_finished(),
            latency_ms = latency.as_millis() as u64,
            "Request completed"
        );
    }
}
