//! # Middleware Module
//!
//! Ready-made continuation units for the application chain.
//!
//! - [`json`] and [`urlencoded`] decode request bodies into `req.body`
//! - [`MetricsMiddleware`] counts requests, latency and status classes
//! - [`TracingMiddleware`] logs request start and completion
//!
//! Types implementing [`Middleware`] get `before`/`after` hooks around the
//! downstream chain; [`into_handler`] turns one into a [`Handler`](crate::handlers::Handler)
//! that can be passed to [`Routes::attach`](crate::router::Routes::attach).

pub mod body;
mod core;
mod metrics;
mod tracing;

pub use body::{json, urlencoded};
pub use core::{into_handler, Middleware};
pub use metrics::MetricsMiddleware;
pub use tracing::TracingMiddleware;
