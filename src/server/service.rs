use std::io::{self, Read};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use http::Method;
use may_minihttp::{HttpService, Request as RawRequest, Response as RawResponse};
use tracing::{debug, info, warn};

use super::request::Request;
use super::response::Response;
use crate::config::AppOptions;
use crate::dispatcher::{DispatchState, Dispatcher};

/// Build the request/response pair for one transport request.
///
/// The body is read up to `bodyLimit + 1` bytes so the decoding units can tell
/// an oversized payload from one that is exactly at the limit.
///
/// # Errors
///
/// Returns `InvalidInput` for a method token `http` rejects, or the I/O error
/// raised while reading the body.
pub fn enhance(raw: RawRequest, options: &AppOptions) -> io::Result<(Request, Response)> {
    let method = Method::from_str(raw.method())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut req = Request::new(method, raw.path());
    for header in raw.headers() {
        match std::str::from_utf8(header.value) {
            Ok(value) => req.push_header(header.name, value),
            Err(_) => debug!(header = header.name, "Non UTF-8 header value skipped"),
        }
    }

    let mut body = Vec::new();
    let limit = options.body_limit.saturating_add(1) as u64;
    raw.body().take(limit).read_to_end(&mut body)?;
    let mut req = req.with_body(body);
    req.enrich(options);

    let res = Response::for_request(&req, options);
    Ok((req, res))
}

/// The per-request entry bound to the transport listener.
#[derive(Clone)]
pub struct AppService {
    dispatcher: Dispatcher,
    options: Arc<AppOptions>,
}

impl AppService {
    pub fn new(dispatcher: Dispatcher, options: Arc<AppOptions>) -> Self {
        AppService {
            dispatcher,
            options,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Dispatch an already built pair.
    pub fn handle(&self, req: &mut Request, res: &mut Response) -> DispatchState {
        let started = Instant::now();
        let state = self.dispatcher.dispatch(req, res);
        if !res.is_finished() {
            debug!(request_id = %req.id(), state = ?state, "Chain ended without finishing the response");
        }
        info!(
            request_id = %req.id(),
            method = %req.method,
            path = %req.pathname,
            status = res.status(),
            state = ?state,
            latency_us = started.elapsed().as_micros() as u64,
            "Request handled"
        );
        state
    }
}

impl HttpService for AppService {
    fn call(&mut self, raw: RawRequest, rsp: &mut RawResponse) -> io::Result<()> {
        let (mut req, mut res) = match enhance(raw, &self.options) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Failed to read request");
                rsp.status_code(400, "Bad Request");
                rsp.body_vec(b"400".to_vec());
                return Ok(());
            }
        };
        self.handle(&mut req, &mut res);
        res.write_to(rsp);
        Ok(())
    }
}
