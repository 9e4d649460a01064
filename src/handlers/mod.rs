//! # Handlers Module
//!
//! Request-handling units and the two calling conventions they can follow.
//!
//! ## Overview
//!
//! Every unit registered with a [`Router`](crate::router::Router), whether as
//! middleware or as a route handler, is a [`Handler`]. A handler is one of:
//!
//! - **Continuation-style** ([`ContinuationHandler`]): receives the request, the
//!   response and a [`Next`](crate::dispatcher::Next) continuation. The unit decides
//!   if and when to advance the chain. It may call `next.run(..)` and post-process
//!   whatever the downstream units produced before finalizing the response.
//! - **Value-style** ([`ValueHandler`]): receives only the request and the response
//!   and reports completion through an [`Outcome`]. Returning [`Outcome::NoResult`]
//!   advances the chain implicitly, returning a value sends it (or hands it back to
//!   an upstream continuation), returning [`Outcome::Deferred`] suspends the
//!   current coroutine until the value resolves.
//!
//! ## Example
//!
//! ```rust,ignore
//! use webium::handlers::{Handler, Outcome};
//! use serde_json::json;
//!
//! let logger = Handler::continuation(|req, res, next| {
//!     tracing::info!(path = %req.pathname, "incoming");
//!     Ok(next.run(req, res))
//! });
//!
//! let hello = Handler::value(|_req, _res| Ok(Outcome::from(json!("Hello, World!"))));
//! ```

mod deferred;
mod types;

pub use deferred::{Deferred, Resolver};
pub use types::{
    ContinuationHandler, Handler, HandlerKind, HandlerResult, Outcome, ValueHandler,
};
