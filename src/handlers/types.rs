use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::Deferred;
use crate::dispatcher::{HandlerError, Next};
use crate::server::{Request, Response};

/// Result of a continuation-style unit.
///
/// `Ok(Some(value))` produces a value (sent at the outermost chain, returned
/// to the caller of `next.run` when nested). `Ok(None)` produces nothing.
pub type HandlerResult = Result<Option<Value>, HandlerError>;

/// Completion of a value-style unit.
#[derive(Debug)]
pub enum Outcome {
    /// Not handled yet: the chain advances unless the response is already finished.
    NoResult,
    /// A produced value.
    Value(Value),
    /// A value that resolves later; the same rules apply once it does.
    Deferred(Deferred),
}

impl Outcome {
    pub fn value(value: impl Into<Value>) -> Self {
        Outcome::Value(value.into())
    }

    pub fn is_no_result(&self) -> bool {
        matches!(self, Outcome::NoResult)
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl From<Option<Value>> for Outcome {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(v) => Outcome::Value(v),
            None => Outcome::NoResult,
        }
    }
}

impl From<Deferred> for Outcome {
    fn from(deferred: Deferred) -> Self {
        Outcome::Deferred(deferred)
    }
}

/// A unit that advances the chain itself through the [`Next`] continuation.
pub trait ContinuationHandler: Send + Sync {
    fn call(&self, req: &mut Request, res: &mut Response, next: &mut Next<'_>) -> HandlerResult;
}

impl<F> ContinuationHandler for F
where
    F: Fn(&mut Request, &mut Response, &mut Next<'_>) -> HandlerResult + Send + Sync,
{
    fn call(&self, req: &mut Request, res: &mut Response, next: &mut Next<'_>) -> HandlerResult {
        self(req, res, next)
    }
}

/// A unit that reports completion by returning an [`Outcome`].
pub trait ValueHandler: Send + Sync {
    fn call(&self, req: &mut Request, res: &mut Response) -> Result<Outcome, HandlerError>;
}

impl<F> ValueHandler for F
where
    F: Fn(&mut Request, &mut Response) -> Result<Outcome, HandlerError> + Send + Sync,
{
    fn call(&self, req: &mut Request, res: &mut Response) -> Result<Outcome, HandlerError> {
        self(req, res)
    }
}

/// The calling convention a [`Handler`] was registered with.
pub enum HandlerKind {
    Continuation(Box<dyn ContinuationHandler>),
    Value(Box<dyn ValueHandler>),
}

/// A registered request-handling unit.
///
/// Cloning is cheap and preserves identity: two clones of the same handler
/// compare equal under [`Handler::same`], which is what
/// [`Router::contains`](crate::router::Router::contains) uses to look up a
/// specific handler instance.
#[derive(Clone)]
pub struct Handler(Arc<HandlerKind>);

impl Handler {
    /// Wrap a continuation-style closure.
    pub fn continuation<F>(f: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &mut Next<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        Self::from_continuation(f)
    }

    /// Wrap a value-style closure.
    pub fn value<F>(f: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> Result<Outcome, HandlerError> + Send + Sync + 'static,
    {
        Self::from_value(f)
    }

    pub fn from_continuation(handler: impl ContinuationHandler + 'static) -> Self {
        Handler(Arc::new(HandlerKind::Continuation(Box::new(handler))))
    }

    pub fn from_value(handler: impl ValueHandler + 'static) -> Self {
        Handler(Arc::new(HandlerKind::Value(Box::new(handler))))
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.0
    }

    pub fn is_continuation(&self) -> bool {
        matches!(*self.0, HandlerKind::Continuation(_))
    }

    /// Whether both values refer to the same registered unit.
    pub fn same(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let style = if self.is_continuation() {
            "continuation"
        } else {
            "value"
        };
        f.debug_struct("Handler")
            .field("style", &style)
            .field("id", &Arc::as_ptr(&self.0))
            .finish()
    }
}
