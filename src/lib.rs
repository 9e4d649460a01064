//! # webium
//!
//! **webium** is a coroutine-powered request router and middleware dispatcher
//! built on the `may` runtime and `may_minihttp`.
//!
//! ## Overview
//!
//! An application is one routing unit: an ordered list of middleware and an
//! ordered list of route entries. Each entry pairs a path pattern with one
//! handler chain per HTTP method. For every request the dispatcher runs the
//! middleware, then scans the routes in registration order and runs the first
//! chain whose pattern and method both match. Handlers may hand control on to
//! the next unit, produce a value to be sent, or fail; failures are presented
//! once through a pluggable error hook.
//!
//! ## Architecture
//!
//! - **[`router`]** - Path patterns, route entries and the registration surface ([`Routes`])
//! - **[`handlers`]** - The two handler calling conventions and deferred values
//! - **[`dispatcher`]** - Per-request middleware and route walk, error presentation
//! - **[`server`]** - Request enrichment, response presentation and the listener
//! - **[`middleware`]** - Body decoding, metrics and request logging units
//! - **[`config`]** - Application options loaded from YAML, JSON or TOML
//! - **[`app`]** - The facade tying the routing unit to a listener
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as may_minihttp
//!     participant Service as AppService
//!     participant Dispatcher
//!     participant Middleware
//!     participant Route as Route chain
//!     participant Hook as ErrorHandler
//!
//!     Client->>Server: HTTP request
//!     Server->>Service: call(raw, rsp)
//!     Service->>Service: enhance (headers, cookies, proxy, body bytes)
//!     Service->>Dispatcher: dispatch(req, res)
//!     Dispatcher->>Middleware: run units in order
//!     Middleware-->>Dispatcher: chain exhausted
//!     loop routes in registration order
//!         Dispatcher->>Dispatcher: pattern match, set params
//!         Dispatcher->>Route: run handlers for method
//!     end
//!     alt no pattern matched
//!         Dispatcher->>Hook: 404
//!     else matched under other methods only
//!         Dispatcher->>Hook: 405
//!     end
//!     Service->>Server: write status, headers, body
//!     Server-->>Client: HTTP response
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use webium::{App, Handler, Outcome, Routes};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut app = App::default();
//!     app.get(
//!         "/user/:id",
//!         Handler::value(|req, _res| Ok(Outcome::from(json!({ "id": req.param("id") })))),
//!     )?;
//!     let addr = app.listen("127.0.0.1:8080")?;
//!     println!("listening on {addr}");
//!     app.wait()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Handler Styles
//!
//! ```rust,ignore
//! // Continuation-style: decides when downstream units run
//! Handler::continuation(|req, res, next| {
//!     let produced = next.run(req, res);
//!     Ok(produced.map(|v| json!({ "wrapped": v })))
//! });
//!
//! // Value-style: NoResult advances, a value is sent
//! Handler::value(|_req, _res| Ok(Outcome::NoResult));
//!
//! // Deferred: resolved on its own coroutine
//! Handler::value(|_req, _res| Ok(Outcome::from(Deferred::spawn(|| Ok(Outcome::value(1))))));
//! ```
//!
//! ## Configuration
//!
//! [`AppOptions`] controls host parsing, proxy trust, header capitalization,
//! cookie signing, JSONP and case sensitivity. `WEBIUM_STACK_SIZE` sets the
//! coroutine stack size (see [`runtime_config`]).
//!
//! ## Logging
//!
//! Everything logs through `tracing` with structured fields. Binaries pick
//! the subscriber; the demo uses `tracing-subscriber` with `RUST_LOG`.

pub mod app;
pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod ids;
pub mod middleware;
pub mod router;
pub mod runtime_config;
pub mod server;

pub use app::App;
pub use config::AppOptions;
pub use dispatcher::{DispatchState, Dispatcher, ErrorHandler, Failure, HandlerError, Next};
pub use handlers::{Deferred, Handler, Outcome};
pub use router::{Mode, PathSpec, RouteError, Router, Routes};
pub use server::{Cookie, Request, Response};
