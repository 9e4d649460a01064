//! # Application Options
//!
//! [`AppOptions`] configures request enrichment, response presentation and body
//! decoding. Every key is optional; missing keys take their defaults:
//!
//! | Key             | Default  | Effect |
//! |-----------------|----------|--------|
//! | `domain`        | `""`     | Domain name(s) used to compute `req.subdomain` |
//! | `useProxy`      | `false`  | Prefer `X-Forwarded-*` headers for protocol, host and ip |
//! | `capitalize`    | `true`   | Emit response header names in `Title-Case` |
//! | `cookieSecret`  | `""`     | Secret for signing and verifying cookies |
//! | `jsonp`         | `false`  | Query parameter naming the JSONP callback |
//! | `caseSensitive` | `false`  | Case-sensitive route patterns |
//! | `bodyLimit`     | `102400` | Largest request body the decoders accept, in bytes |
//!
//! Options can be loaded from YAML, JSON or TOML:
//!
//! ```yaml
//! domain: [example.com, example.org]
//! useProxy: true
//! cookieSecret: s3cret
//! jsonp: callback
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024;

/// One domain or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Domains {
    One(String),
    Many(Vec<String>),
}

impl Default for Domains {
    fn default() -> Self {
        Domains::One(String::new())
    }
}

impl Domains {
    /// Configured domains, skipping empty entries.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Domains::One(d) => std::slice::from_ref(d),
            Domains::Many(ds) => ds.as_slice(),
        };
        slice.iter().map(String::as_str).filter(|d| !d.is_empty())
    }
}

/// JSONP is either off or names the callback query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Jsonp {
    Toggle(bool),
    Callback(String),
}

impl Default for Jsonp {
    fn default() -> Self {
        Jsonp::Toggle(false)
    }
}

impl Jsonp {
    /// The query parameter carrying the callback name, when enabled.
    pub fn param(&self) -> Option<&str> {
        match self {
            Jsonp::Callback(name) if !name.is_empty() => Some(name),
            Jsonp::Toggle(true) => Some("callback"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppOptions {
    pub domain: Domains,
    pub use_proxy: bool,
    pub capitalize: bool,
    pub cookie_secret: String,
    pub jsonp: Jsonp,
    pub case_sensitive: bool,
    pub body_limit: usize,
    /// Any other keys, kept for application-defined units.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Default for AppOptions {
    fn default() -> Self {
        AppOptions {
            domain: Domains::default(),
            use_proxy: false,
            capitalize: true,
            cookie_secret: String::new(),
            jsonp: Jsonp::default(),
            case_sensitive: false,
            body_limit: DEFAULT_BODY_LIMIT,
            extra: HashMap::new(),
        }
    }
}

impl AppOptions {
    /// Load options from a `.yaml`/`.yml`, `.json` or `.toml` file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or its extension is not one
    /// of the above.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read options file {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let options = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?,
            "toml" => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            other => bail!("Unsupported options file extension '{other}' for {}", path.display()),
        };
        Ok(options)
    }

    pub fn cookie_secret(&self) -> Option<&str> {
        if self.cookie_secret.is_empty() {
            None
        } else {
            Some(&self.cookie_secret)
        }
    }
}
