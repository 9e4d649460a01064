use std::any::Any;
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::server::{Request, Response};

/// A fault raised by a request-handling unit.
#[derive(Debug)]
pub enum HandlerError {
    /// An error-shaped value; presented through its message.
    Error(anyhow::Error),
    /// Raw text raised by a unit.
    Text(String),
    /// Any other value raised by a unit.
    Value(Value),
    /// The unit panicked; carries the panic message when one was available.
    Panic(String),
}

impl HandlerError {
    pub fn text(msg: impl Into<String>) -> Self {
        HandlerError::Text(msg.into())
    }

    pub fn from_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HandlerError::Error(anyhow::Error::new(err))
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        HandlerError::Panic(msg)
    }

    /// The message presented by the default error hook, if the fault carries one.
    pub fn message(&self) -> Option<String> {
        match self {
            HandlerError::Error(e) => Some(e.to_string()),
            HandlerError::Text(s) => Some(s.clone()),
            HandlerError::Panic(s) => Some(s.clone()),
            HandlerError::Value(Value::String(s)) => Some(s.clone()),
            HandlerError::Value(_) => None,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Error(e) => write!(f, "{e}"),
            HandlerError::Text(s) => write!(f, "{s}"),
            HandlerError::Value(v) => write!(f, "{v}"),
            HandlerError::Panic(s) => write!(f, "handler panicked: {s}"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Error(err)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::from_error(err)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::from_error(err)
    }
}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        HandlerError::Text(msg)
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        HandlerError::Text(msg.to_string())
    }
}

/// What the error hook is asked to present.
#[derive(Debug)]
pub enum Failure {
    /// No route pattern matched the request path.
    NotFound,
    /// A route pattern matched but none of the matching entries handle the method.
    MethodNotAllowed,
    /// A unit failed while handling the request.
    Handler(HandlerError),
}

impl Failure {
    pub fn status(&self) -> Option<u16> {
        match self {
            Failure::NotFound => Some(404),
            Failure::MethodNotAllowed => Some(405),
            Failure::Handler(_) => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::NotFound => write!(f, "404"),
            Failure::MethodNotAllowed => write!(f, "405"),
            Failure::Handler(e) => write!(f, "{e}"),
        }
    }
}

/// The single finalization hook on the failure path.
///
/// Not-found, method-not-allowed and handler faults all arrive here. The
/// dispatcher has already set status 404 or 405 for the first two before
/// calling the hook. Implementations are installed once, at
/// [`App::with_error_handler`](crate::app::App::with_error_handler) or
/// [`Dispatcher::with_error_handler`](crate::dispatcher::Dispatcher::with_error_handler).
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, failure: Failure, req: &Request, res: &mut Response);
}

impl<F> ErrorHandler for F
where
    F: Fn(Failure, &Request, &mut Response) + Send + Sync,
{
    fn on_error(&self, failure: Failure, req: &Request, res: &mut Response) {
        self(failure, req, res)
    }
}

/// Presents failures as plain text.
///
/// A response already carrying 404 or 405 ends with that status as its body
/// (or with the fault message if a unit failed under such a status). Anything
/// else becomes a 500 whose body is the fault message, or the status number
/// when the fault has none.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn on_error(&self, failure: Failure, req: &Request, res: &mut Response) {
        if res.is_finished() {
            debug!(request_id = %req.id(), failure = %failure, "Response already finished, failure not presented");
            return;
        }
        let status = res.status();
        if status == 404 || status == 405 {
            let body = match &failure {
                Failure::Handler(e) => e.message().unwrap_or_else(|| status.to_string()),
                _ => status.to_string(),
            };
            res.end(body);
            return;
        }
        res.set_status(500);
        let body = match failure {
            Failure::Handler(e) => e.message().unwrap_or_else(|| "500".to_string()),
            Failure::NotFound | Failure::MethodNotAllowed => "500".to_string(),
        };
        res.end(body);
    }
}
