use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::{Extensions, Method};
use serde_json::Value;
use smallvec::SmallVec;

use super::cookies::{parse_cookies, unsign};
use crate::config::AppOptions;
use crate::ids::RequestId;

/// Maximum number of request headers stored inline before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Request headers with lowercase names, in arrival order.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Credentials from an `Authorization: Basic` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// What a forwarding proxy reported about the original request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyInfo {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub ip: Option<String>,
    pub ips: Vec<String>,
}

/// An inbound request with parsed URL, headers, cookies and connection facts.
///
/// `params` is rewritten by the dispatcher for every route entry whose pattern
/// matches; `body` is filled in by the body decoding units.
#[derive(Debug)]
pub struct Request {
    id: RequestId,
    pub method: Method,
    /// Path and query as requested.
    pub url: String,
    /// Path without the query string.
    pub pathname: String,
    /// Query string with its leading `?`, or empty.
    pub search: String,
    pub query: HashMap<String, String>,
    headers: HeaderVec,
    pub cookies: HashMap<String, String>,
    /// Cookies whose signature verified against `cookieSecret`.
    pub signed_cookies: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub body: Option<Value>,
    raw_body: Vec<u8>,
    extensions: Extensions,
    pub protocol: String,
    pub secure: bool,
    /// Host including port.
    pub host: String,
    pub hostname: String,
    pub port: Option<u16>,
    pub subdomain: String,
    pub ip: String,
    pub ips: Vec<String>,
    pub proxy: Option<ProxyInfo>,
    pub auth: Option<BasicAuth>,
}

impl Request {
    /// A request for `method` and `url` with no headers and no body.
    pub fn new(method: Method, url: &str) -> Self {
        let (pathname, search) = match url.find('?') {
            Some(pos) => (&url[..pos], &url[pos..]),
            None => (url, ""),
        };
        let pathname = if pathname.is_empty() { "/" } else { pathname };
        let query = url::form_urlencoded::parse(search.trim_start_matches('?').as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Request {
            id: RequestId::new(),
            method,
            url: url.to_string(),
            pathname: pathname.to_string(),
            search: search.to_string(),
            query,
            headers: HeaderVec::new(),
            cookies: HashMap::new(),
            signed_cookies: HashMap::new(),
            params: HashMap::new(),
            body: None,
            raw_body: Vec::new(),
            extensions: Extensions::new(),
            protocol: "http".to_string(),
            secure: false,
            host: String::new(),
            hostname: String::new(),
            port: None,
            subdomain: String::new(),
            ip: String::new(),
            ips: Vec::new(),
            proxy: None,
            auth: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.push_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.raw_body = body.into();
        self
    }

    /// Derive cookies, host, proxy, ip and auth fields from the headers.
    pub fn enriched(mut self, options: &AppOptions) -> Self {
        self.enrich(options);
        self
    }

    pub(crate) fn push_header(&mut self, name: &str, value: &str) {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase().as_str()), value.to_string()));
    }

    pub(crate) fn enrich(&mut self, options: &AppOptions) {
        if let Some(id) = self
            .header("x-request-id")
            .and_then(|h| h.parse::<RequestId>().ok())
        {
            self.id = id;
        }

        self.cookies = self.header("cookie").map(parse_cookies).unwrap_or_default();
        self.signed_cookies = match options.cookie_secret() {
            Some(secret) => self
                .cookies
                .iter()
                .filter_map(|(k, v)| unsign(v, secret).map(|v| (k.clone(), v)))
                .collect(),
            None => HashMap::new(),
        };

        self.proxy = self.proxy_info();
        let proxy = if options.use_proxy { self.proxy.clone() } else { None };

        self.protocol = proxy
            .as_ref()
            .and_then(|p| p.protocol.clone())
            .unwrap_or_else(|| "http".to_string());
        self.secure = self.protocol == "https";

        self.host = proxy
            .as_ref()
            .and_then(|p| p.host.clone())
            .or_else(|| self.header("host").map(str::to_string))
            .unwrap_or_default();
        let (hostname, port) = split_host(&self.host);
        self.hostname = hostname;
        self.port = port.or(if self.host.is_empty() {
            None
        } else if self.secure {
            Some(443)
        } else {
            Some(80)
        });
        self.subdomain = options
            .domain
            .iter()
            .find_map(|d| subdomain_of(&self.hostname, d))
            .unwrap_or_default();

        match proxy {
            Some(p) if !p.ips.is_empty() => {
                self.ip = p.ip.unwrap_or_default();
                self.ips = p.ips;
            }
            _ => {
                self.ips = if self.ip.is_empty() { Vec::new() } else { vec![self.ip.clone()] };
            }
        }

        self.auth = self.header("authorization").and_then(parse_basic_auth);
    }

    fn proxy_info(&self) -> Option<ProxyInfo> {
        let protocol = self
            .header("x-forwarded-proto")
            .map(|p| p.split(',').next().unwrap_or(p).trim().to_ascii_lowercase());
        let host = self
            .header("x-forwarded-host")
            .map(|h| h.split(',').next().unwrap_or(h).trim().to_string());
        let ips: Vec<String> = self
            .header("x-forwarded-for")
            .map(|f| {
                f.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if protocol.is_none() && host.is_none() && ips.is_empty() {
            return None;
        }
        Some(ProxyInfo {
            protocol,
            host,
            ip: ips.first().cloned(),
            ips,
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Case-insensitive header lookup; the first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// `Content-Type` without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
    }

    /// The `charset` parameter of `Content-Type`.
    pub fn charset(&self) -> Option<String> {
        let ct = self.header("content-type")?;
        ct.split(';').skip(1).find_map(|p| {
            let (k, v) = p.split_once('=')?;
            if k.trim().eq_ignore_ascii_case("charset") {
                Some(v.trim().trim_matches('"').to_ascii_lowercase())
            } else {
                None
            }
        })
    }

    /// Whether the request body's content type matches any of `types`.
    ///
    /// Accepts full types (`application/json`), wildcards (`text/*`, `*/json`),
    /// `+suffix` forms (`+json`) and the short words `json`, `html`, `text`,
    /// `xml` and `urlencoded`. Returns the first type that matched.
    pub fn is<'t>(&self, types: &[&'t str]) -> Option<&'t str> {
        let actual = self.content_type()?;
        types.iter().copied().find(|t| mime_matches(&actual, t))
    }

    /// `Accept` entries ordered by quality.
    pub fn accepts(&self) -> Vec<String> {
        self.header("accept").map(quality_list).unwrap_or_default()
    }

    pub fn languages(&self) -> Vec<String> {
        self.header("accept-language").map(quality_list).unwrap_or_default()
    }

    pub fn encodings(&self) -> Vec<String> {
        self.header("accept-encoding").map(quality_list).unwrap_or_default()
    }

    pub fn referer(&self) -> Option<&str> {
        self.header("referer").or_else(|| self.header("referrer"))
    }

    pub fn xhr(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    pub fn keep_alive(&self) -> bool {
        self.header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("keep-alive"))
    }
}

fn split_host(host: &str) -> (String, Option<u16>) {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((addr, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (addr.to_string(), port);
        }
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') => (name.to_string(), port.parse().ok()),
        _ => (host.to_string(), None),
    }
}

fn subdomain_of(hostname: &str, domain: &str) -> Option<String> {
    let hostname = hostname.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    if hostname == domain {
        return Some(String::new());
    }
    hostname
        .strip_suffix(&domain)
        .and_then(|prefix| prefix.strip_suffix('.'))
        .map(str::to_string)
}

fn parse_basic_auth(header: &str) -> Option<BasicAuth> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(BasicAuth {
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn quality_list(header: &str) -> Vec<String> {
    let mut entries: Vec<(String, f32, usize)> = header
        .split(',')
        .enumerate()
        .filter_map(|(pos, item)| {
            let mut parts = item.split(';');
            let value = parts.next()?.trim();
            if value.is_empty() {
                return None;
            }
            let q = parts
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((value.to_string(), q, pos))
        })
        .filter(|(_, q, _)| *q > 0.0)
        .collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
    entries.into_iter().map(|(v, _, _)| v).collect()
}

pub(crate) fn mime_matches(actual: &str, wanted: &str) -> bool {
    let wanted = match wanted {
        "json" => "application/json",
        "html" => "text/html",
        "text" => "text/plain",
        "xml" => "application/xml",
        "urlencoded" => "application/x-www-form-urlencoded",
        other => other,
    };
    if let Some(suffix) = wanted.strip_prefix('+') {
        return actual.ends_with(&format!("+{suffix}"));
    }
    let Some((wt, ws)) = wanted.split_once('/') else {
        return false;
    };
    let Some((at, asub)) = actual.split_once('/') else {
        return false;
    };
    (wt == "*" || wt.eq_ignore_ascii_case(at)) && (ws == "*" || ws.eq_ignore_ascii_case(asub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Domains, Jsonp};

    #[test]
    fn test_url_parts() {
        let req = Request::new(Method::GET, "/search?q=rust&page=2");
        assert_eq!(req.pathname, "/search");
        assert_eq!(req.search, "?q=rust&page=2");
        assert_eq!(req.query.get("q").map(String::as_str), Some("rust"));
        assert_eq!(req.query.get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = Request::new(Method::GET, "/").with_header("Content-Type", "application/json; charset=UTF-8");
        assert_eq!(req.header("content-type"), Some("application/json; charset=UTF-8"));
        assert_eq!(req.content_type().as_deref(), Some("application/json"));
        assert_eq!(req.charset().as_deref(), Some("utf-8"));
        assert_eq!(req.is(&["html", "json"]), Some("json"));
        assert_eq!(req.is(&["*/json"]), Some("*/json"));
        assert_eq!(req.is(&["text/*"]), None);
    }

    #[test]
    fn test_host_and_subdomain() {
        let options = AppOptions {
            domain: Domains::Many(vec!["example.com".into(), "example.org".into()]),
            ..AppOptions::default()
        };
        let req = Request::new(Method::GET, "/")
            .with_header("Host", "api.v2.example.org:8080")
            .enriched(&options);
        assert_eq!(req.hostname, "api.v2.example.org");
        assert_eq!(req.port, Some(8080));
        assert_eq!(req.subdomain, "api.v2");
        assert_eq!(req.protocol, "http");
        assert!(!req.secure);
    }

    #[test]
    fn test_proxy_headers_only_with_use_proxy() {
        let build = || {
            Request::new(Method::GET, "/")
                .with_header("Host", "internal:3000")
                .with_header("X-Forwarded-Proto", "https")
                .with_header("X-Forwarded-Host", "shop.example.com")
                .with_header("X-Forwarded-For", "203.0.113.7, 10.0.0.2")
        };

        let direct = build().enriched(&AppOptions::default());
        assert_eq!(direct.host, "internal:3000");
        assert_eq!(direct.protocol, "http");
        assert!(direct.proxy.is_some());
        assert_eq!(direct.ip, "");

        let proxied = build().enriched(&AppOptions {
            use_proxy: true,
            ..AppOptions::default()
        });
        assert_eq!(proxied.host, "shop.example.com");
        assert_eq!(proxied.hostname, "shop.example.com");
        assert_eq!(proxied.port, Some(443));
        assert!(proxied.secure);
        assert_eq!(proxied.ip, "203.0.113.7");
        assert_eq!(proxied.ips, vec!["203.0.113.7", "10.0.0.2"]);
    }

    #[test]
    fn test_cookies_and_signed_cookies() {
        let signed = crate::server::cookies::sign("Luna", "s3cret").unwrap();
        let header = format!("plain=1; user={signed}");
        let options = AppOptions {
            cookie_secret: "s3cret".into(),
            jsonp: Jsonp::Toggle(false),
            ..AppOptions::default()
        };
        let req = Request::new(Method::GET, "/").with_header("Cookie", &header).enriched(&options);
        assert_eq!(req.cookies.get("plain").map(String::as_str), Some("1"));
        assert_eq!(req.signed_cookies.get("user").map(String::as_str), Some("Luna"));
        assert!(!req.signed_cookies.contains_key("plain"));
    }

    #[test]
    fn test_basic_auth() {
        let req = Request::new(Method::GET, "/")
            .with_header("Authorization", "Basic dXNlcjpwYXNz")
            .enriched(&AppOptions::default());
        assert_eq!(
            req.auth,
            Some(BasicAuth {
                username: "user".into(),
                password: "pass".into()
            })
        );
    }

    #[test]
    fn test_quality_ordering() {
        let req = Request::new(Method::GET, "/")
            .with_header("Accept", "text/html;q=0.5, application/json, */*;q=0.1");
        assert_eq!(req.accepts(), vec!["application/json", "text/html", "*/*"]);
    }

    #[test]
    fn test_ipv6_host() {
        assert_eq!(split_host("[::1]:8080"), ("::1".to_string(), Some(8080)));
        assert_eq!(split_host("localhost"), ("localhost".to_string(), None));
    }
}
