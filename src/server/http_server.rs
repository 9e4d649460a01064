use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use may::coroutine::JoinHandle;
use may_minihttp::HttpService;
use tracing::{debug, info};

/// Typed wrapper around `may_minihttp`'s server.
///
/// Wraps any [`HttpService`], in practice [`AppService`](super::AppService),
/// and binds it to a listener coroutine with [`HttpServer::start`].
pub struct HttpServer<T>(pub T);

/// Handle to a running listener.
///
/// Holds the bound address and the listener coroutine, so the owner can wait
/// for readiness, stop the server or join it.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll the bound address until it accepts connections.
    ///
    /// Tries a TCP connection every 5ms. `App::listen` calls this before it
    /// reports the address, so callers can send requests right away.
    ///
    /// # Returns
    ///
    /// `Ok(())` once a connection succeeds
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the listener is not accepting within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Cancel the listener coroutine and wait for it to finish.
    pub fn stop(self) {
        // SAFETY: cancel() is marked unsafe by the may runtime. The handle is owned
        // here and consumed, so the coroutine is cancelled exactly once.
        unsafe {
            self.handle.coroutine().cancel();
        }
        if self.handle.join().is_err() {
            debug!(addr = %self.addr, "Listener coroutine ended with a panic during shutdown");
        }
        info!(addr = %self.addr, "Server stopped");
    }

    /// Block until the listener coroutine finishes.
    ///
    /// The listener runs until [`ServerHandle::stop`] cancels it or it fails.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the coroutine completed normally
    ///
    /// # Errors
    ///
    /// Returns an error if the listener coroutine panicked.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Bind `addr` and start serving.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address to bind, such as `"127.0.0.1:8080"`; the first resolved address is used
    ///
    /// # Returns
    ///
    /// A [`ServerHandle`] for the running listener
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let handle = may_minihttp::HttpServer(self.0).start(addr)?;
        info!(addr = %addr, "Server listening");
        Ok(ServerHandle { addr, handle })
    }
}
