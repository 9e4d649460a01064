//! The application: one routing unit plus options and an error hook.
//!
//! Registration and serving are separate phases. [`App::listen`] snapshots
//! the routing unit into a read-only [`Dispatcher`]; registrations made
//! after that do not reach the running listener.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppOptions;
use crate::dispatcher::{DefaultErrorHandler, Dispatcher, ErrorHandler};
use crate::middleware::{json, urlencoded};
use crate::router::{Router, Routes};
use crate::runtime_config::RuntimeConfig;
use crate::server::{AppService, HttpServer, ServerHandle};

pub struct App {
    router: Router,
    options: Arc<AppOptions>,
    error_handler: Arc<dyn ErrorHandler>,
    server: Option<ServerHandle>,
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppOptions::default())
    }
}

impl App {
    /// An application with the url-encoded (extended) and JSON body units
    /// installed as its first middleware.
    pub fn new(options: AppOptions) -> Self {
        let mut router = Router::with_case_sensitivity(options.case_sensitive);
        router.add_middleware(urlencoded(true, options.body_limit));
        router.add_middleware(json(options.body_limit));
        App {
            router,
            options: Arc::new(options),
            error_handler: Arc::new(DefaultErrorHandler),
            server: None,
        }
    }

    /// An application with no middleware installed.
    pub fn bare(options: AppOptions) -> Self {
        App {
            router: Router::with_case_sensitivity(options.case_sensitive),
            options: Arc::new(options),
            error_handler: Arc::new(DefaultErrorHandler),
            server: None,
        }
    }

    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Snapshot the routing unit as it is now.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.router.clone()).with_shared_error_handler(Arc::clone(&self.error_handler))
    }

    pub fn service(&self) -> AppService {
        AppService::new(self.dispatcher(), Arc::clone(&self.options))
    }

    /// Bind `addr`, start serving and return the bound address.
    ///
    /// # Errors
    ///
    /// Fails if the application is already listening, the address cannot be
    /// bound, or the listener does not start accepting in time.
    pub fn listen<A: ToSocketAddrs>(&mut self, addr: A) -> io::Result<SocketAddr> {
        if let Some(server) = &self.server {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("already listening on {}", server.addr()),
            ));
        }
        let runtime = RuntimeConfig::from_env();
        may::config().set_stack_size(runtime.stack_size);
        self.router.log_routes();

        let handle = HttpServer(self.service()).start(addr)?;
        if let Err(e) = handle.wait_ready() {
            warn!(addr = %handle.addr(), error = %e, "Listener did not become ready");
            handle.stop();
            return Err(e);
        }
        let bound = handle.addr();
        info!(
            addr = %bound,
            stack_size = runtime.stack_size,
            middleware = self.router.middleware().len(),
            routes = self.router.routes().len(),
            "Application listening"
        );
        self.server = Some(handle);
        Ok(bound)
    }

    /// Address of the running listener, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::addr)
    }

    /// Stop the listener. Does nothing when not listening.
    pub fn close(&mut self) {
        if let Some(server) = self.server.take() {
            server.stop();
        }
    }

    /// Block until the listener exits.
    ///
    /// Returns immediately when not listening.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener coroutine panicked.
    pub fn wait(&mut self) -> io::Result<()> {
        match self.server.take() {
            Some(server) => server
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "listener coroutine panicked")),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("middleware", &self.router.middleware().len())
            .field("routes", &self.router.routes().len())
            .field("listening", &self.local_addr())
            .finish_non_exhaustive()
    }
}

impl Routes for App {
    fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{Handler, Outcome};
    use crate::server::{Request, Response};
    use http::Method;
    use serde_json::json;

    #[test]
    fn test_new_installs_body_units() {
        let app = App::default();
        assert_eq!(app.router().middleware().len(), 2);
        assert_eq!(App::bare(AppOptions::default()).router().middleware().len(), 0);
    }

    #[test]
    fn test_dispatcher_is_a_snapshot() {
        let mut app = App::default();
        app.get("/a", Handler::value(|_req, _res| Ok(Outcome::value("a"))))
            .unwrap();
        let dispatcher = app.dispatcher();
        app.get("/b", Handler::value(|_req, _res| Ok(Outcome::value("b"))))
            .unwrap();

        let mut req = Request::new(Method::GET, "/b");
        let mut res = Response::new();
        dispatcher.dispatch(&mut req, &mut res);
        assert_eq!(res.status(), 404);
        assert_eq!(app.dispatcher().router().routes().len(), 2);
    }

    #[test]
    fn test_json_body_reaches_route() {
        let mut app = App::default();
        app.post(
            "/echo",
            Handler::value(|req, _res| Ok(Outcome::from(req.body.clone()))),
        )
        .unwrap();
        let mut req = Request::new(Method::POST, "/echo")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"a":1}"#);
        let mut res = Response::new();
        app.dispatcher().dispatch(&mut req, &mut res);
        assert_eq!(res.body_json().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_close_without_listen_is_noop() {
        let mut app = App::default();
        app.close();
        assert!(app.local_addr().is_none());
        assert!(app.wait().is_ok());
    }
}
