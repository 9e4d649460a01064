use std::fmt;

/// Raised synchronously by route registration.
#[derive(Debug)]
pub enum RouteError {
    /// The method name is not a valid HTTP method token.
    InvalidMethod { name: String },
    /// A path template could not be compiled.
    InvalidPattern { path: String, source: regex::Error },
    /// A path template is malformed before it ever reaches the regex engine.
    MalformedTemplate { path: String, reason: &'static str },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::InvalidMethod { name } => {
                write!(f, "'{name}' is not a valid HTTP method")
            }
            RouteError::InvalidPattern { path, source } => {
                write!(f, "Invalid route pattern '{path}': {source}")
            }
            RouteError::MalformedTemplate { path, reason } => {
                write!(f, "Malformed route template '{path}': {reason}")
            }
        }
    }
}

impl std::error::Error for RouteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouteError::InvalidPattern { source, .. } => Some(source),
            _ => None,
        }
    }
}
