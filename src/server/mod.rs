//! # Server Module
//!
//! Request enrichment, response presentation and the `may_minihttp` binding.
//!
//! - [`Request`] and [`Response`] are the pair every handler unit works on
//! - [`enhance`] builds that pair from a transport request and [`AppOptions`](crate::config::AppOptions)
//! - [`AppService`] is the per-request entry handed to the listener
//! - [`HttpServer`] and [`ServerHandle`] start and stop the listener

pub mod cookies;
pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use cookies::{Cookie, SameSite};
pub use http_server::{HttpServer, ServerHandle};
pub use request::{BasicAuth, HeaderVec, ProxyInfo, Request, MAX_INLINE_HEADERS};
pub use response::Response;
pub use service::{enhance, AppService};
