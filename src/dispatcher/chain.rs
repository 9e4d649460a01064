use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;
use tracing::{debug, error};

use super::{Failure, HandlerError};
use crate::handlers::{Handler, HandlerKind, Outcome};
use crate::server::{Request, Response};

/// What a chain hands control to when it runs out of units, and where its
/// faults go.
pub(crate) trait Flow {
    /// Called exactly when the cursor reaches the end of the chain.
    fn complete(&mut self, req: &mut Request, res: &mut Response, nested: bool) -> Option<Value>;

    /// Present a fault raised by a unit.
    fn fault(&mut self, failure: Failure, req: &mut Request, res: &mut Response);
}

/// The continuation passed to continuation-style units.
///
/// Each call to [`Next::run`] moves the chain cursor forward by one and runs the
/// unit it lands on. When the cursor reaches the end of the chain, control
/// passes on (from middleware to route matching, from one route chain to the
/// rest of the route walk). Advancing a chain that has already moved past its
/// end, or whose response is already finished, does nothing.
pub struct Next<'a> {
    handlers: &'a [Handler],
    cursor: usize,
    flow: &'a mut dyn Flow,
}

impl<'a> Next<'a> {
    pub(crate) fn new(handlers: &'a [Handler], flow: &'a mut dyn Flow) -> Self {
        Next {
            handlers,
            cursor: 0,
            flow,
        }
    }

    /// Advance to the next unit and return what the downstream units produced.
    ///
    /// A fault raised downstream is presented through the error hook where it
    /// happens; the caller then sees `None`.
    pub fn run(&mut self, req: &mut Request, res: &mut Response) -> Option<Value> {
        self.advance(req, res, true)
    }

    /// Like [`Next::run`], but first makes `ctx` available to downstream units
    /// through [`Request::extensions`].
    pub fn run_with<T>(&mut self, req: &mut Request, res: &mut Response, ctx: T) -> Option<Value>
    where
        T: Clone + Send + Sync + 'static,
    {
        req.extensions_mut().insert(ctx);
        self.run(req, res)
    }

    pub(crate) fn advance(&mut self, req: &mut Request, res: &mut Response, nested: bool) -> Option<Value> {
        if res.is_finished() {
            debug!(request_id = %req.id(), "Response finished, chain not advanced");
            return None;
        }
        let len = self.handlers.len();
        let index = self.cursor;
        if index > len {
            debug!(request_id = %req.id(), index, len, "Chain already exhausted, advance ignored");
            return None;
        }
        self.cursor += 1;
        if index == len {
            return self.flow.complete(req, res, nested);
        }

        let handlers = self.handlers;
        match handlers[index].kind() {
            HandlerKind::Continuation(unit) => {
                let result = catch_unwind(AssertUnwindSafe(|| unit.call(req, res, self)));
                match flatten(result) {
                    Ok(produced) => self.deliver(produced, req, res, nested),
                    Err(err) => self.fail(err, req, res),
                }
            }
            HandlerKind::Value(unit) => {
                let result = catch_unwind(AssertUnwindSafe(|| unit.call(req, res)));
                match flatten(result) {
                    Ok(outcome) => self.settle(outcome, req, res, nested),
                    Err(err) => self.fail(err, req, res),
                }
            }
        }
    }

    fn settle(&mut self, outcome: Outcome, req: &mut Request, res: &mut Response, nested: bool) -> Option<Value> {
        match outcome {
            Outcome::NoResult => {
                if res.is_finished() {
                    None
                } else {
                    self.advance(req, res, nested)
                }
            }
            Outcome::Value(value) => self.deliver(Some(value), req, res, nested),
            Outcome::Deferred(deferred) => match deferred.wait() {
                Ok(resolved) => self.settle(resolved, req, res, nested),
                Err(err) => self.fail(err, req, res),
            },
        }
    }

    fn deliver(&mut self, produced: Option<Value>, _req: &mut Request, res: &mut Response, nested: bool) -> Option<Value> {
        match produced {
            Some(value) if nested => Some(value),
            Some(value) => {
                if !res.is_finished() {
                    res.send(value);
                }
                None
            }
            None => None,
        }
    }

    fn fail(&mut self, err: HandlerError, req: &mut Request, res: &mut Response) -> Option<Value> {
        error!(request_id = %req.id(), method = %req.method, path = %req.pathname, error = %err, "Handler failed");
        self.flow.fault(Failure::Handler(err), req, res);
        None
    }
}

fn flatten<T>(result: std::thread::Result<Result<T, HandlerError>>) -> Result<T, HandlerError> {
    match result {
        Ok(inner) => inner,
        Err(panic) => Err(HandlerError::from_panic(panic.as_ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        completions: usize,
        faults: Vec<String>,
        produce: Option<Value>,
    }

    impl Flow for Recorder {
        fn complete(&mut self, _req: &mut Request, _res: &mut Response, _nested: bool) -> Option<Value> {
            self.completions += 1;
            self.produce.clone()
        }

        fn fault(&mut self, failure: Failure, _req: &mut Request, res: &mut Response) {
            self.faults.push(failure.to_string());
            res.set_status(500);
            res.end(failure.to_string());
        }
    }

    fn run_chain(handlers: &[Handler], flow: &mut Recorder) -> Response {
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        let mut next = Next::new(handlers, flow);
        next.advance(&mut req, &mut res, false);
        res
    }

    fn tracking(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Handler {
        let log = Arc::clone(log);
        Handler::continuation(move |req, res, next| {
            log.lock().unwrap().push(name);
            Ok(next.run(req, res))
        })
    }

    #[test]
    fn test_units_run_in_order_then_complete() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![tracking(&log, "a"), tracking(&log, "b"), tracking(&log, "c")];
        let mut flow = Recorder::default();
        run_chain(&handlers, &mut flow);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(flow.completions, 1);
    }

    #[test]
    fn test_double_advance_is_ignored() {
        let handlers = vec![Handler::continuation(|req, res, next| {
            next.run(req, res);
            next.run(req, res);
            next.run(req, res);
            Ok(None)
        })];
        let mut flow = Recorder::default();
        run_chain(&handlers, &mut flow);
        assert_eq!(flow.completions, 1);
    }

    #[test]
    fn test_value_at_outermost_is_sent() {
        let handlers = vec![Handler::value(|_req, _res| Ok(Outcome::value("Hello")))];
        let mut flow = Recorder::default();
        let res = run_chain(&handlers, &mut flow);
        assert_eq!(res.body_text(), "Hello");
        assert_eq!(flow.completions, 0);
    }

    #[test]
    fn test_no_result_advances() {
        let handlers = vec![
            Handler::value(|_req, _res| Ok(Outcome::NoResult)),
            Handler::value(|_req, _res| Ok(Outcome::value("second"))),
        ];
        let mut flow = Recorder::default();
        let res = run_chain(&handlers, &mut flow);
        assert_eq!(res.body_text(), "second");
    }

    #[test]
    fn test_finished_response_stops_chain() {
        let handlers = vec![
            Handler::value(|_req, res| {
                res.send(json!("first"));
                Ok(Outcome::NoResult)
            }),
            Handler::value(|_req, _res| Ok(Outcome::value("second"))),
        ];
        let mut flow = Recorder::default();
        let res = run_chain(&handlers, &mut flow);
        assert_eq!(res.body_text(), "first");
        assert_eq!(flow.completions, 0);
    }

    #[test]
    fn test_nested_run_returns_downstream_value() {
        let handlers = vec![
            Handler::continuation(|req, res, next| {
                let inner = next.run(req, res).unwrap_or(Value::Null);
                Ok(Some(json!({ "wrapped": inner })))
            }),
            Handler::value(|_req, _res| Ok(Outcome::value("inner"))),
        ];
        let mut flow = Recorder::default();
        let res = run_chain(&handlers, &mut flow);
        assert_eq!(res.body_json(), Some(json!({"wrapped": "inner"})));
    }

    #[test]
    fn test_completion_value_reaches_nested_caller() {
        let handlers = vec![Handler::continuation(|req, res, next| {
            let v = next.run(req, res);
            Ok(v.map(|v| json!([v, "seen"])))
        })];
        let mut flow = Recorder {
            produce: Some(json!("route")),
            ..Recorder::default()
        };
        let res = run_chain(&handlers, &mut flow);
        assert_eq!(res.body_json(), Some(json!(["route", "seen"])));
    }

    #[test]
    fn test_errors_and_panics_are_funneled_once() {
        let handlers = vec![Handler::value(|_req, _res| Err(HandlerError::text("bad")))];
        let mut flow = Recorder::default();
        let res = run_chain(&handlers, &mut flow);
        assert_eq!(flow.faults, vec!["bad".to_string()]);
        assert_eq!(res.status(), 500);

        let handlers = vec![Handler::value(|_req, _res| -> Result<Outcome, HandlerError> {
            panic!("kaboom")
        })];
        let mut flow = Recorder::default();
        run_chain(&handlers, &mut flow);
        assert_eq!(flow.faults.len(), 1);
        assert!(flow.faults[0].contains("kaboom"));
    }

    #[test]
    fn test_run_with_exposes_context() {
        #[derive(Clone)]
        struct Tenant(&'static str);

        let handlers = vec![
            Handler::continuation(|req, res, next| Ok(next.run_with(req, res, Tenant("acme")))),
            Handler::value(|req, _res| {
                let tenant = req.extensions().get::<Tenant>().map(|t| t.0).unwrap_or("none");
                Ok(Outcome::value(tenant))
            }),
        ];
        let mut flow = Recorder::default();
        let res = run_chain(&handlers, &mut flow);
        assert_eq!(res.body_text(), "acme");
    }
}
