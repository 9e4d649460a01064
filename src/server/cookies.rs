use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_PREFIX: &str = "s:";

/// Parse a `Cookie` request header into name/value pairs.
///
/// Values are percent-decoded and surrounding quotes are removed. The first
/// occurrence of a name wins, as browsers send the most specific cookie first.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let Some(name) = parts.next().map(str::trim).filter(|n| !n.is_empty()) else {
            continue;
        };
        let raw = parts.next().unwrap_or("").trim();
        let raw = raw
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(raw);
        let value = urlencoding::decode(raw)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        cookies.entry(name.to_string()).or_insert(value);
    }
    cookies
}

fn keyed(value: &str, secret: &str) -> Result<HmacSha256, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(value.as_bytes());
    Ok(mac)
}

/// Sign `value` so it can be verified with [`unsign`].
///
/// The result has the form `s:<value>.<signature>`, where the signature is the
/// HMAC-SHA256 of `value` keyed by `secret`, base64 encoded without padding.
///
/// # Errors
///
/// Returns [`InvalidLength`] if the MAC rejects the key.
pub fn sign(value: &str, secret: &str) -> Result<String, InvalidLength> {
    let tag = keyed(value, secret)?.finalize().into_bytes();
    Ok(format!("{SIGNED_PREFIX}{value}.{}", STANDARD_NO_PAD.encode(tag)))
}

/// Verify a value produced by [`sign`], returning the original value.
pub fn unsign(signed: &str, secret: &str) -> Option<String> {
    let body = signed.strip_prefix(SIGNED_PREFIX)?;
    let (value, sig) = body.rsplit_once('.')?;
    let tag = STANDARD_NO_PAD.decode(sig).ok()?;
    keyed(value, secret).ok()?.verify_slice(&tag).ok()?;
    Some(value.to_string())
}

/// The `SameSite` attribute of a response cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// A cookie to be sent with `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub max_age: Option<i64>,
    /// Preformatted HTTP date.
    pub expires: Option<String>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub same_site: Option<SameSite>,
    pub http_only: bool,
    pub secure: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Cookie {
            name: name.into(),
            value: value.into(),
            max_age: None,
            expires: None,
            domain: None,
            path: None,
            same_site: None,
            http_only: false,
            secure: false,
        }
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn expires(mut self, http_date: impl Into<String>) -> Self {
        self.expires = Some(http_date.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn http_only(mut self, on: bool) -> Self {
        self.http_only = on;
        self
    }

    pub fn secure(mut self, on: bool) -> Self {
        self.secure = on;
        self
    }

    /// Parse a `Set-Cookie` style string such as `username=Luna; Max-Age=120; HttpOnly`.
    pub fn parse(s: &str) -> Option<Cookie> {
        let mut parts = s.split(';');
        let (name, value) = parts.next()?.trim().split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = urlencoding::decode(value.trim())
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.trim().to_string());
        let mut cookie = Cookie::new(name, value);
        for attr in parts {
            let (key, val) = match attr.trim().split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (attr.trim(), None),
            };
            match (key.to_ascii_lowercase().as_str(), val) {
                ("max-age", Some(v)) => cookie.max_age = v.parse().ok(),
                ("expires", Some(v)) => cookie.expires = Some(v.to_string()),
                ("domain", Some(v)) => cookie.domain = Some(v.to_string()),
                ("path", Some(v)) => cookie.path = Some(v.to_string()),
                ("samesite", v) => {
                    cookie.same_site = match v.map(str::to_ascii_lowercase).as_deref() {
                        Some("strict") | None => Some(SameSite::Strict),
                        Some("none") => Some(SameSite::None),
                        _ => Some(SameSite::Lax),
                    }
                }
                ("httponly", _) => cookie.http_only = true,
                ("secure", _) => cookie.secure = true,
                _ => {}
            }
        }
        Some(cookie)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, urlencoding::encode(&self.value))?;
        if let Some(age) = self.max_age {
            write!(f, "; Max-Age={age}")?;
        }
        if let Some(expires) = &self.expires {
            write!(f, "; Expires={expires}")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        match self.same_site {
            Some(SameSite::Strict) => write!(f, "; SameSite=Strict")?,
            Some(SameSite::Lax) => write!(f, "; SameSite=Lax")?,
            Some(SameSite::None) => write!(f, "; SameSite=None")?,
            None => {}
        }
        if self.http_only {
            write!(f, "; HttpOnly")?;
        }
        if self.secure {
            write!(f, "; Secure")?;
        }
        Ok(())
    }
}
