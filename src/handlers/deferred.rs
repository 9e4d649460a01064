use std::fmt;
use std::io;

use may::coroutine::{self, JoinHandle};
use may::sync::mpsc;
use tracing::{debug, error};

use super::Outcome;
use crate::dispatcher::HandlerError;
use crate::runtime_config::RuntimeConfig;

type Settled = Result<Outcome, HandlerError>;

enum Pending {
    Task(JoinHandle<Settled>),
    Channel(mpsc::Receiver<Settled>),
    Ready(Box<Settled>),
}

/// A value produced asynchronously on the `may` coroutine runtime.
///
/// Waiting on a deferred value parks only the calling coroutine (or blocks the
/// calling thread when used outside the runtime). A deferred value may resolve
/// to another deferred value; [`Deferred::wait`] keeps resolving until a plain
/// [`Outcome`] appears.
pub struct Deferred {
    pending: Pending,
}

/// Producer half of [`Deferred::channel`].
///
/// Dropping a resolver without completing it resolves the paired value to an error.
pub struct Resolver {
    tx: mpsc::Sender<Settled>,
}

impl Deferred {
    /// Run `f` on its own coroutine and defer to its result.
    ///
    /// The coroutine uses the stack size from [`RuntimeConfig::from_env`]. A panic
    /// inside `f` resolves to [`HandlerError::Panic`].
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<Outcome, HandlerError> + Send + 'static,
    {
        let stack_size = RuntimeConfig::from_env().stack_size;
        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
        // The closure is Send + 'static and owns everything it touches; its result is
        // only observed through the returned JoinHandle.
        let spawned: io::Result<JoinHandle<Settled>> = unsafe {
            coroutine::Builder::new()
                .name("webium-deferred".to_string())
                .stack_size(stack_size)
                .spawn(f)
        };
        match spawned {
            Ok(handle) => Deferred {
                pending: Pending::Task(handle),
            },
            Err(e) => {
                error!(error = %e, stack_size, "Failed to spawn deferred coroutine");
                Deferred::ready(Err(HandlerError::from(e)))
            }
        }
    }

    /// A pair of resolver and deferred value, connected by a channel.
    ///
    /// The resolver can be completed from any thread or coroutine.
    pub fn channel() -> (Resolver, Deferred) {
        let (tx, rx) = mpsc::channel();
        (
            Resolver { tx },
            Deferred {
                pending: Pending::Channel(rx),
            },
        )
    }

    /// An already settled value.
    pub fn ready(settled: Result<Outcome, HandlerError>) -> Self {
        Deferred {
            pending: Pending::Ready(Box::new(settled)),
        }
    }

    /// Wait until the value settles to a non-deferred outcome.
    ///
    /// # Errors
    ///
    /// Returns the producer's error, [`HandlerError::Panic`] if the producing
    /// coroutine panicked, or a text error if a [`Resolver`] was dropped unresolved.
    pub fn wait(self) -> Result<Outcome, HandlerError> {
        let mut current = self;
        loop {
            match current.settle()? {
                Outcome::Deferred(inner) => {
                    debug!("Deferred value resolved to another deferred value");
                    current = inner;
                }
                outcome => return Ok(outcome),
            }
        }
    }

    fn settle(self) -> Settled {
        match self.pending {
            Pending::Ready(settled) => *settled,
            Pending::Task(handle) => match handle.join() {
                Ok(settled) => settled,
                Err(panic) => Err(HandlerError::from_panic(panic.as_ref())),
            },
            Pending::Channel(rx) => match rx.recv() {
                Ok(settled) => settled,
                Err(_) => Err(HandlerError::text("deferred value was dropped before it resolved")),
            },
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.pending {
            Pending::Task(_) => "task",
            Pending::Channel(_) => "channel",
            Pending::Ready(_) => "ready",
        };
        f.debug_struct("Deferred").field("pending", &state).finish()
    }
}

impl Resolver {
    pub fn resolve(self, outcome: impl Into<Outcome>) {
        self.settle(Ok(outcome.into()));
    }

    pub fn reject(self, err: impl Into<HandlerError>) {
        self.settle(Err(err.into()));
    }

    fn settle(self, settled: Settled) {
        if self.tx.send(settled).is_err() {
            debug!("Deferred value resolved after its consumer went away");
        }
    }
}
