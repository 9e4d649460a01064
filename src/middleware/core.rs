use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::handlers::Handler;
use crate::server::{Request, Response};

/// Hooks that run around the rest of the chain.
///
/// `before` runs when the unit is reached. Returning `Some(value)` (or
/// finishing the response) short-circuits: downstream units are skipped and
/// the value is produced in their place. Otherwise the chain advances and
/// `after` runs once everything downstream has returned.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &mut Request, _res: &mut Response) -> Option<Value> {
        None
    }
    fn after(&self, _req: &Request, _res: &mut Response, _latency: Duration) {}
}

/// Turn a [`Middleware`] into a continuation unit.
pub fn into_handler<M: Middleware + 'static>(middleware: Arc<M>) -> Handler {
    Handler::continuation(move |req, res, next| {
        if let Some(value) = middleware.before(req, res) {
            return Ok(Some(value));
        }
        if res.is_finished() {
            return Ok(None);
        }
        let started = Instant::now();
        let produced = next.run(req, res);
        middleware.after(req, res, started.elapsed());
        Ok(produced)
    })
}
