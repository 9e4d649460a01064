//! # Router Module
//!
//! Routing units: ordered route tables plus their own middleware, composable by merging.
//!
//! ## Overview
//!
//! A [`Router`] is responsible for:
//! - Compiling path specifications into matchers ([`Matcher`])
//! - Keeping one [`RouteEntry`] per distinct [`PathSpec`], in registration order
//! - Holding per-method handler chains for each entry
//! - Merging another routing unit into itself (sub-application mounting)
//! - Answering existence queries (`contains`, `methods`)
//!
//! ## Path Specifications
//!
//! Templates use `:name` segments and the `*` wildcard; a precompiled
//! [`regex::Regex`] can be registered as well. See [`Matcher::compile`] for
//! the grammar.
//!
//! ## Example
//!
//! ```rust,ignore
//! use webium::handlers::{Handler, Outcome};
//! use webium::router::{Router, Routes};
//! use serde_json::json;
//!
//! let mut users = Router::new();
//! users.get("/user/:id", Handler::value(|req, _res| {
//!     Ok(Outcome::value(json!({ "id": req.params["id"] })))
//! }))?;
//!
//! let mut root = Router::new();
//! root.attach(users);
//! assert!(root.contains("GET", "/user/:id", None));
//! ```
//!
//! ## Performance
//!
//! Dispatch scans entries linearly, testing each compiled pattern in order.
//! Lookups by key (registration, `contains`, `methods`) go through a hash index.

mod core;
mod error;
mod pattern;

pub use core::{Mode, RouteEntry, Router, Routes, Unit, METHODS};
pub use error::RouteError;
pub use pattern::{Matcher, ParamVec, PathSpec, SpecKey, MAX_INLINE_PARAMS};
