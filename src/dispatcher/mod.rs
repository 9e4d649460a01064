//! # Dispatcher Module
//!
//! The per-request control loop: run the routing unit's middleware, then walk
//! its routes in registration order and run the first chain whose pattern and
//! method both match.
//!
//! ## Request Flow
//!
//! 1. The middleware chain runs. Every unit must advance (explicitly through
//!    [`Next::run`] or implicitly by returning [`Outcome::NoResult`](crate::handlers::Outcome))
//!    before route matching begins.
//! 2. Routes are tested in registration order. A structural match sets
//!    `req.params`; the entry's handlers for the request method then run as
//!    their own chain. When that chain is exhausted, the walk resumes at the
//!    following route.
//! 3. If the walk runs out of routes, a request that never matched a pattern
//!    gets a 404, and one that matched only under other methods gets a 405.
//!    Both go through the same [`ErrorHandler`] used for handler faults.
//!
//! ## Error Handling
//!
//! - Units returning `Err` and units that panic are caught where they run
//! - The fault is presented once through the error hook, and the chain stops
//! - A finished response is never written again
//!
//! ## Concurrency
//!
//! [`Dispatcher`] holds the routing unit behind an `Arc` and never mutates it.
//! Cursor and match flags live on the stack of each [`Dispatcher::dispatch`]
//! call. A unit returning a deferred value parks only the coroutine serving
//! its own request.

mod chain;
mod core;
mod error;

pub use chain::Next;
pub use core::{DispatchState, Dispatcher};
pub use error::{DefaultErrorHandler, ErrorHandler, Failure, HandlerError};
