use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::cookies::{sign, Cookie};
use super::request::Request;
use crate::config::AppOptions;
use crate::dispatcher::HandlerError;

/// The transport accepts this many response header lines.
pub const MAX_RESPONSE_HEADERS: usize = 16;

/// Distinct header lines kept for the process lifetime.
const MAX_INTERNED_HEADER_LINES: usize = 8192;

static HEADER_LINES: Lazy<Mutex<HeaderLines>> =
    Lazy::new(|| Mutex::new(HeaderLines::with_capacity(MAX_INTERNED_HEADER_LINES)));

/// Interned `'static` header lines, as the transport only takes `'static` lines.
///
/// A repeated line costs one allocation for the life of the process. Once the
/// table holds `capacity` lines, new lines are still leaked for the response
/// that needs them but are no longer remembered.
struct HeaderLines {
    lines: HashSet<&'static str>,
    capacity: usize,
}

impl HeaderLines {
    fn with_capacity(capacity: usize) -> Self {
        HeaderLines {
            lines: HashSet::new(),
            capacity,
        }
    }

    fn line(&mut self, line: String) -> &'static str {
        if let Some(existing) = self.lines.get(line.as_str()) {
            return *existing;
        }
        let leaked: &'static str = Box::leak(line.into_boxed_str());
        if self.lines.len() < self.capacity {
            self.lines.insert(leaked);
        } else {
            debug!(capacity = self.capacity, "Header line table full, line not interned");
        }
        leaked
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lines.len()
    }
}

fn header_line(line: String) -> &'static str {
    let mut lines = match HEADER_LINES.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    lines.line(line)
}

fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// `content-type` becomes `Content-Type`.
pub fn capitalize_header(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn expand_type(ty: &str) -> &str {
    match ty {
        "json" => "application/json",
        "html" => "text/html",
        "text" => "text/plain",
        "xml" => "application/xml",
        "js" | "javascript" => "application/javascript",
        "bin" | "octet-stream" => "application/octet-stream",
        other => other,
    }
}

/// Guess the type of a text body the way `send` presents strings.
fn detect_text_type(text: &str) -> &'static str {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        "application/xml"
    } else if trimmed.starts_with('<') {
        "text/html"
    } else if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
    {
        "application/json"
    } else {
        "text/plain"
    }
}

fn valid_callback(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']'))
}

/// The response being built for one request.
///
/// Nothing reaches the socket until the per-request entry returns; `finished`
/// marks the point after which the response no longer accepts writes.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    finished: bool,
    capitalize: bool,
    head: bool,
    jsonp: Option<String>,
    cookie_secret: Option<String>,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
            finished: false,
            capitalize: true,
            head: false,
            jsonp: None,
            cookie_secret: None,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// A response configured for `req`: JSONP callback from the query, HEAD
    /// handling, header capitalization and cookie secret.
    pub fn for_request(req: &Request, options: &AppOptions) -> Self {
        let jsonp = options
            .jsonp
            .param()
            .and_then(|param| req.query.get(param))
            .filter(|cb| valid_callback(cb))
            .cloned();
        Response {
            capitalize: options.capitalize,
            head: req.method == http::Method::HEAD,
            jsonp,
            cookie_secret: options.cookie_secret().map(str::to_string),
            ..Self::default()
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        if self.finished {
            debug!(status, "Status change after response finished ignored");
        } else {
            self.status = status;
        }
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set a header, replacing any previous values.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if self.finished {
            debug!(header = name, "Header change after response finished ignored");
            return self;
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Add a header value without removing existing ones.
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if !self.finished {
            self.headers.push((name.to_string(), value.into()));
        }
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        if !self.finished {
            self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }
        self
    }

    /// `Content-Type` without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    /// Set `Content-Type`; short words such as `json` or `html` are expanded.
    pub fn set_content_type(&mut self, ty: &str) -> &mut Self {
        let full = expand_type(ty);
        let value = if full.starts_with("text/") || full == "application/json" || full == "application/javascript" {
            format!("{full}; charset=utf-8")
        } else {
            full.to_string()
        };
        self.set_header("Content-Type", value)
    }

    /// Override the JSONP callback for this response.
    pub fn set_jsonp(&mut self, callback: Option<&str>) -> &mut Self {
        self.jsonp = callback.filter(|cb| valid_callback(cb)).map(str::to_string);
        self
    }

    pub fn set_cookie(&mut self, cookie: &Cookie) -> &mut Self {
        self.append_header("Set-Cookie", cookie.to_string())
    }

    /// Expire a cookie on the client.
    pub fn clear_cookie(&mut self, name: &str) -> &mut Self {
        let cookie = Cookie::new(name, "").max_age(0).path("/");
        self.set_cookie(&cookie)
    }

    /// Set a cookie signed with `cookieSecret`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if no `cookieSecret` is configured.
    pub fn set_signed_cookie(&mut self, cookie: &Cookie) -> Result<&mut Self, HandlerError> {
        let Some(secret) = self.cookie_secret.as_deref() else {
            return Err(HandlerError::text("cookieSecret is required for signed cookies"));
        };
        let mut signed = cookie.clone();
        signed.value = sign(&cookie.value, secret)
            .map_err(|e| HandlerError::text(format!("cookie signing failed: {e}")))?;
        Ok(self.set_cookie(&signed))
    }

    /// Redirect to `location` with `status` (301 or 302, defaulting to 302).
    pub fn redirect(&mut self, location: &str, status: Option<u16>) {
        let status = status.unwrap_or(302);
        self.set_status(status);
        self.set_header("Location", location);
        self.set_content_type("html");
        let body = format!("Redirecting to <a href=\"{location}\">{location}</a>.");
        self.end(body);
    }

    /// Ask the client for Basic credentials.
    pub fn auth(&mut self, realm: &str) {
        self.set_status(401);
        self.set_header("WWW-Authenticate", format!("Basic realm=\"{realm}\""));
        self.end("401");
    }

    /// Send `value` as the body and finish the response.
    ///
    /// `null` sends an empty body. Strings are typed by their content
    /// (`text/html`, `application/xml`, `application/json`, else `text/plain`).
    /// Other values are serialized as JSON, or as a JSONP call when a callback
    /// is set. An explicitly set `Content-Type` is kept.
    pub fn send(&mut self, value: Value) {
        if self.finished {
            debug!("send() after response finished ignored");
            return;
        }
        match value {
            Value::Null => self.end(""),
            Value::String(text) => {
                if self.header("content-type").is_none() {
                    self.set_content_type(detect_text_type(&text));
                }
                self.end(text);
            }
            other => {
                let json = match serde_json::to_string(&other) {
                    Ok(j) => j,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize response body");
                        self.set_status(500);
                        self.end("500");
                        return;
                    }
                };
                if let Some(cb) = self.jsonp.clone() {
                    self.set_content_type("js");
                    self.set_header("X-Content-Type-Options", "nosniff");
                    self.end(format!("/**/ typeof {cb} === 'function' && {cb}({json});"));
                } else {
                    if self.header("content-type").is_none() {
                        self.set_content_type("json");
                    }
                    self.end(json);
                }
            }
        }
    }

    /// Send raw bytes as `application/octet-stream` unless a type is already set.
    pub fn send_bytes(&mut self, bytes: Vec<u8>) {
        if self.finished {
            return;
        }
        if self.header("content-type").is_none() {
            self.set_content_type("bin");
        }
        self.end(bytes);
    }

    /// Finish the response with `body`. Later writes are ignored.
    pub fn end(&mut self, body: impl AsRef<[u8]>) {
        if self.finished {
            debug!("end() after response finished ignored");
            return;
        }
        self.body.clear();
        self.body.extend_from_slice(body.as_ref());
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Headers go out with the body once the entry returns, so this mirrors `is_finished`.
    pub fn headers_sent(&self) -> bool {
        self.finished
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Copy status, headers and body onto the transport response.
    pub(crate) fn write_to(&self, raw: &mut may_minihttp::Response) {
        raw.status_code(self.status as usize, status_reason(self.status));
        let mut written = 0usize;
        for (name, value) in &self.headers {
            if written >= MAX_RESPONSE_HEADERS {
                warn!(header = %name, limit = MAX_RESPONSE_HEADERS, "Response header dropped, limit reached");
                continue;
            }
            let name = if self.capitalize {
                capitalize_header(name)
            } else {
                name.clone()
            };
            raw.header(header_line(format!("{name}: {value}")));
            written += 1;
        }
        if self.head {
            raw.body_vec(Vec::new());
        } else {
            raw.body_vec(self.body.clone());
        }
    }
}
