use std::collections::HashMap;

use http::Method;
use tracing::{debug, info};

use super::pattern::{Matcher, PathSpec, SpecKey};
use super::RouteError;
use crate::handlers::Handler;

/// Every method registered by [`Routes::all`] and [`Routes::any`].
pub const METHODS: [Method; 9] = [
    Method::CONNECT,
    Method::DELETE,
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
    Method::POST,
    Method::PUT,
    Method::TRACE,
];

/// How a registration treats handlers already present for its (path, method).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Append to the existing handler list.
    #[default]
    Append,
    /// Replace the existing handler list, so repeating the registration is idempotent.
    Replace,
}

/// One path specification with its per-method handler chains.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    spec: PathSpec,
    key: SpecKey,
    matcher: Matcher,
    /// Methods in the order they were first registered.
    handlers: Vec<(Method, Vec<Handler>)>,
}

impl RouteEntry {
    fn new(spec: PathSpec, case_sensitive: bool) -> Result<Self, RouteError> {
        let matcher = Matcher::compile(&spec, case_sensitive)?;
        Ok(RouteEntry {
            key: spec.key(),
            spec,
            matcher,
            handlers: Vec::new(),
        })
    }

    pub fn spec(&self) -> &PathSpec {
        &self.spec
    }

    pub fn key(&self) -> &SpecKey {
        &self.key
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.matcher.param_names()
    }

    /// The handler chain for `method`, if it has at least one unit.
    pub fn handlers_for(&self, method: &Method) -> Option<&[Handler]> {
        self.handlers
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, h)| h.as_slice())
            .filter(|h| !h.is_empty())
    }

    /// Methods with at least one handler, in first-registration order.
    pub fn methods(&self) -> Vec<Method> {
        self.handlers
            .iter()
            .filter(|(_, h)| !h.is_empty())
            .map(|(m, _)| m.clone())
            .collect()
    }

    fn chain_mut(&mut self, method: Method) -> &mut Vec<Handler> {
        let pos = match self.handlers.iter().position(|(m, _)| *m == method) {
            Some(pos) => pos,
            None => {
                self.handlers.push((method, Vec::new()));
                self.handlers.len() - 1
            }
        };
        &mut self.handlers[pos].1
    }

    fn push(&mut self, method: Method, handler: Handler, mode: Mode) {
        let chain = self.chain_mut(method);
        if mode == Mode::Replace {
            chain.clear();
        }
        chain.push(handler);
    }

    fn absorb(&mut self, other: RouteEntry) {
        for (method, handlers) in other.handlers {
            self.chain_mut(method).extend(handlers);
        }
    }
}

/// A composable routing unit: middleware plus route entries in registration order.
///
/// Entries are keyed by their [`SpecKey`]; registering the same path twice
/// reuses its entry. The key index and the ordered entry list are kept side by
/// side so lookups are by key while dispatch iterates in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Router {
    middleware: Vec<Handler>,
    routes: Vec<RouteEntry>,
    index: HashMap<SpecKey, usize>,
    case_sensitive: bool,
}

/// What [`Routes::attach`] accepts.
pub enum Unit {
    Handler(Handler),
    Router(Router),
}

impl From<Handler> for Unit {
    fn from(handler: Handler) -> Self {
        Unit::Handler(handler)
    }
}

impl From<Router> for Unit {
    fn from(router: Router) -> Self {
        Unit::Router(router)
    }
}

impl From<&Router> for Unit {
    fn from(router: &Router) -> Self {
        Unit::Router(router.clone())
    }
}

impl Router {
    /// Create an empty, case-insensitive routing unit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty routing unit with the given case sensitivity.
    ///
    /// Sensitivity applies to patterns compiled by this unit; entries merged in
    /// from another unit keep the matchers they were compiled with.
    #[must_use]
    pub fn with_case_sensitivity(case_sensitive: bool) -> Self {
        Router {
            case_sensitive,
            ..Self::default()
        }
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub(crate) fn set_case_sensitive(&mut self, case_sensitive: bool) {
        self.case_sensitive = case_sensitive;
    }

    pub fn middleware(&self) -> &[Handler] {
        &self.middleware
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    /// The entry registered under `path`, if any.
    pub fn entry(&self, path: impl Into<PathSpec>) -> Option<&RouteEntry> {
        let key = path.into().key();
        self.index.get(&key).map(|&i| &self.routes[i])
    }

    /// Register `handler` for `method` on `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidMethod`] for a name that is not an HTTP
    /// method token, or the compile error of a new path specification. Nothing
    /// is registered on error.
    pub fn add_route(
        &mut self,
        method: &str,
        path: impl Into<PathSpec>,
        handler: Handler,
        mode: Mode,
    ) -> Result<(), RouteError> {
        let method = parse_method(method)?;
        let spec = path.into();
        debug!(method = %method, path = %spec, ?mode, "Registering route handler");
        let i = self.entry_index(spec)?;
        self.routes[i].push(method, handler, mode);
        Ok(())
    }

    /// Append a unit to the middleware list.
    pub fn add_middleware(&mut self, handler: Handler) {
        debug!(handler = ?handler, position = self.middleware.len(), "Registering middleware");
        self.middleware.push(handler);
    }

    /// Attach a bare handler as middleware, or merge another routing unit.
    ///
    /// Merging concatenates middleware (this unit's first). An entry whose key
    /// already exists here gets the other unit's handlers appended per method;
    /// any other entry is appended, keeping its relative order.
    pub fn attach_unit(&mut self, unit: impl Into<Unit>) {
        match unit.into() {
            Unit::Handler(handler) => self.add_middleware(handler),
            Unit::Router(other) => self.merge(other),
        }
    }

    fn merge(&mut self, other: Router) {
        let Router {
            middleware, routes, ..
        } = other;
        let merged_routes = routes.len();
        let merged_middleware = middleware.len();
        self.middleware.extend(middleware);
        let mut appended = 0usize;
        for entry in routes {
            let existing = self.index.get(&entry.key).copied();
            match existing {
                Some(i) => self.routes[i].absorb(entry),
                None => {
                    self.index.insert(entry.key.clone(), self.routes.len());
                    self.routes.push(entry);
                    appended += 1;
                }
            }
        }
        debug!(
            merged_routes,
            merged_middleware,
            appended_routes = appended,
            routes_count = self.routes.len(),
            "Merged routing unit"
        );
    }

    /// Whether `path` has a handler for `method`, optionally a specific one.
    ///
    /// `path` addresses the entry registered under that exact specification.
    pub fn contains(&self, method: &str, path: impl Into<PathSpec>, handler: Option<&Handler>) -> bool {
        let Ok(method) = parse_method(method) else {
            return false;
        };
        let Some(chain) = self.entry(path).and_then(|e| e.handlers_for(&method)) else {
            return false;
        };
        match handler {
            Some(h) => chain.iter().any(|c| c.same(h)),
            None => true,
        }
    }

    /// Methods with at least one handler on the entry registered under `path`.
    pub fn methods(&self, path: impl Into<PathSpec>) -> Vec<Method> {
        self.entry(path).map(RouteEntry::methods).unwrap_or_default()
    }

    /// Log the routing table at info level.
    pub fn log_routes(&self) {
        let routes_summary: Vec<String> = self
            .routes
            .iter()
            .take(10)
            .map(|e| {
                let methods: Vec<&str> = e.handlers.iter().map(|(m, _)| m.as_str()).collect();
                format!("{} [{}]", e.spec, methods.join(","))
            })
            .collect();
        info!(
            routes_count = self.routes.len(),
            middleware_count = self.middleware.len(),
            case_sensitive = self.case_sensitive,
            routes_summary = ?routes_summary,
            "Routing table loaded"
        );
    }

    fn entry_index(&mut self, spec: PathSpec) -> Result<usize, RouteError> {
        let key = spec.key();
        if let Some(&i) = self.index.get(&key) {
            return Ok(i);
        }
        let entry = RouteEntry::new(spec, self.case_sensitive)?;
        let i = self.routes.len();
        self.routes.push(entry);
        self.index.insert(key, i);
        Ok(i)
    }
}

fn parse_method(name: &str) -> Result<Method, RouteError> {
    let upper = name.trim().to_ascii_uppercase();
    Method::from_bytes(upper.as_bytes()).map_err(|_| RouteError::InvalidMethod {
        name: name.to_string(),
    })
}

/// Registration surface shared by [`Router`] and [`App`](crate::app::App).
///
/// Every method returns `&mut Self` on success so registrations chain with `?`.
///
/// # Errors
///
/// Registration fails with a [`RouteError`] as described on
/// [`Router::add_route`]; the routing unit is left unchanged.
pub trait Routes {
    fn router_mut(&mut self) -> &mut Router;

    /// Register under an arbitrary method name (case-insensitive).
    fn method(&mut self, name: &str, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.method_with_mode(name, path, handler, Mode::Append)
    }

    /// Register, replacing any handlers already present for this path and method.
    fn method_unique(&mut self, name: &str, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.method_with_mode(name, path, handler, Mode::Replace)
    }

    fn method_with_mode(
        &mut self,
        name: &str,
        path: impl Into<PathSpec>,
        handler: Handler,
        mode: Mode,
    ) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.router_mut().add_route(name, path, handler, mode)?;
        Ok(self)
    }

    fn get(&mut self, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.method("GET", path, handler)
    }

    fn post(&mut self, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.method("POST", path, handler)
    }

    fn put(&mut self, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.method("PUT", path, handler)
    }

    fn patch(&mut self, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.method("PATCH", path, handler)
    }

    fn delete(&mut self, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.method("DELETE", path, handler)
    }

    fn head(&mut self, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.method("HEAD", path, handler)
    }

    fn options(&mut self, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.method("OPTIONS", path, handler)
    }

    /// Register under every method in [`METHODS`].
    fn all(&mut self, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        let spec = path.into();
        for method in &METHODS {
            self.router_mut()
                .add_route(method.as_str(), spec.clone(), handler.clone(), Mode::Append)?;
        }
        Ok(self)
    }

    /// Alias of [`Routes::all`].
    fn any(&mut self, path: impl Into<PathSpec>, handler: Handler) -> Result<&mut Self, RouteError>
    where
        Self: Sized,
    {
        self.all(path, handler)
    }

    /// Attach middleware or merge a routing unit.
    fn attach(&mut self, unit: impl Into<Unit>) -> &mut Self
    where
        Self: Sized,
    {
        self.router_mut().attach_unit(unit);
        self
    }
}

impl Routes for Router {
    fn router_mut(&mut self) -> &mut Router {
        self
    }
}
