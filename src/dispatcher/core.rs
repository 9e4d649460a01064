use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::chain::{Flow, Next};
use super::{DefaultErrorHandler, ErrorHandler, Failure};
use crate::router::Router;
use crate::server::{Request, Response};

/// Where a request is in its walk through middleware and routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Matching,
    MiddlewareRunning,
    RouteRunning,
    Done,
    NotFound,
    MethodNotAllowed,
    Error,
}

impl DispatchState {
    /// Whether the walk has ended.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchState::Done
                | DispatchState::NotFound
                | DispatchState::MethodNotAllowed
                | DispatchState::Error
        )
    }
}

/// Runs requests through a routing unit.
///
/// The routing unit is shared read-only; every call to [`Dispatcher::dispatch`]
/// keeps its own route cursor and flags, so one dispatcher serves any number
/// of concurrent requests.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl Dispatcher {
    pub fn new(router: Router) -> Self {
        Self::from_shared(Arc::new(router))
    }

    pub fn from_shared(router: Arc<Router>) -> Self {
        Dispatcher {
            router,
            error_handler: Arc::new(DefaultErrorHandler),
        }
    }

    /// Replace the failure presentation strategy.
    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    pub(crate) fn with_shared_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Run middleware, then walk the routes in registration order.
    ///
    /// Returns the terminal state of the walk. A chain that ends without
    /// finalizing the response reports [`DispatchState::Done`]; whatever the
    /// response holds at that point is what gets written.
    pub fn dispatch(&self, req: &mut Request, res: &mut Response) -> DispatchState {
        let mut state = RequestState::new(&self.router, self.error_handler.as_ref());
        debug!(
            request_id = %req.id(),
            method = %req.method,
            path = %req.pathname,
            middleware = self.router.middleware().len(),
            routes = self.router.routes().len(),
            "Dispatching request"
        );
        state.run_middleware(req, res);
        state.finish()
    }
}

/// Per-request walk state: route cursor and match flags.
struct RequestState<'r> {
    router: &'r Router,
    error_handler: &'r dyn ErrorHandler,
    cursor: usize,
    structural_match: bool,
    method_match: bool,
    state: DispatchState,
}

impl<'r> RequestState<'r> {
    fn new(router: &'r Router, error_handler: &'r dyn ErrorHandler) -> Self {
        RequestState {
            router,
            error_handler,
            cursor: 0,
            structural_match: false,
            method_match: false,
            state: DispatchState::Matching,
        }
    }

    fn run_middleware(&mut self, req: &mut Request, res: &mut Response) {
        let router: &'r Router = self.router;
        let middleware = router.middleware();
        self.state = DispatchState::MiddlewareRunning;
        let mut next = Next::new(middleware, self);
        next.advance(req, res, false);
    }

    fn finish(self) -> DispatchState {
        if self.state.is_terminal() {
            self.state
        } else {
            DispatchState::Done
        }
    }

    fn advance_route(&mut self, req: &mut Request, res: &mut Response, nested: bool) -> Option<Value> {
        let router: &'r Router = self.router;
        let routes = router.routes();
        while self.cursor < routes.len() {
            let entry = &routes[self.cursor];
            self.cursor += 1;

            let Some(captures) = entry.matcher().matches(&req.pathname) else {
                continue;
            };
            self.structural_match = true;
            req.params.clear();
            for (name, value) in captures {
                req.params.insert(name.to_string(), value);
            }

            let Some(handlers) = entry.handlers_for(&req.method) else {
                debug!(
                    request_id = %req.id(),
                    method = %req.method,
                    pattern = %entry.spec(),
                    "Path matched without a handler for method, scanning on"
                );
                continue;
            };
            self.method_match = true;
            self.state = DispatchState::RouteRunning;
            debug!(
                request_id = %req.id(),
                method = %req.method,
                pattern = %entry.spec(),
                params = ?req.params,
                handlers = handlers.len(),
                "Route matched"
            );
            let mut next = Next::new(handlers, self);
            return next.advance(req, res, nested);
        }

        if !self.structural_match {
            self.state = DispatchState::NotFound;
            debug!(request_id = %req.id(), path = %req.pathname, "No route matched");
            res.set_status(404);
            self.error_handler.on_error(Failure::NotFound, req, res);
        } else if !self.method_match {
            self.state = DispatchState::MethodNotAllowed;
            debug!(request_id = %req.id(), method = %req.method, path = %req.pathname, "Method not allowed");
            res.set_status(405);
            self.error_handler.on_error(Failure::MethodNotAllowed, req, res);
        } else if self.state != DispatchState::Error {
            self.state = DispatchState::Done;
        }
        None
    }
}

impl Flow for RequestState<'_> {
    fn complete(&mut self, req: &mut Request, res: &mut Response, nested: bool) -> Option<Value> {
        self.advance_route(req, res, nested)
    }

    fn fault(&mut self, failure: Failure, req: &mut Request, res: &mut Response) {
        if self.state == DispatchState::Error {
            warn!(request_id = %req.id(), failure = %failure, "Another unit failed on an already failed request");
        }
        self.state = DispatchState::Error;
        self.error_handler.on_error(failure, req, res);
    }
}
