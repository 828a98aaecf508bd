//! Listener lifecycle: bind an [`App`] to a socket, wait for readiness, shut down.

use super::AppService;
use crate::app::App;
use crate::runtime_config::RuntimeConfig;
use may::coroutine::JoinHandle;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

/// How [`ServerHandle::wait_ready`] checks the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub attempts: u32,
    /// Connect timeout per attempt, and the pause between failed attempts.
    pub interval: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            attempts: 50,
            interval: Duration::from_millis(5),
        }
    }
}

/// Serves one [`App`] over HTTP/1.1.
pub struct Server {
    app: Arc<App>,
    runtime: Option<RuntimeConfig>,
    readiness: Readiness,
}

impl Server {
    pub fn new(app: Arc<App>) -> Self {
        Self {
            app,
            runtime: None,
            readiness: Readiness::default(),
        }
    }

    /// Coroutine settings installed just before the listener starts.
    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Bind the first address `addr` resolves to and start accepting.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `addr` resolves to nothing; otherwise the bind error.
    pub fn bind<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = first_addr(addr)?;
        if let Some(runtime) = &self.runtime {
            runtime.apply();
        }
        let service = AppService::new(Arc::clone(&self.app));
        let accept = may_minihttp::HttpServer(service).start(addr)?;
        info!(
            service = %self.app.service_name(),
            addr = %addr,
            routes = self.app.routes().len(),
            "listening"
        );
        Ok(ServerHandle {
            addr,
            app: self.app,
            readiness: self.readiness,
            accept,
        })
    }
}

fn first_addr<A: ToSocketAddrs>(addr: A) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing"))
}

/// A running listener. Dropping the handle leaves the server running; call
/// [`ServerHandle::stop`] to shut it down.
pub struct ServerHandle {
    addr: SocketAddr,
    app: Arc<App>,
    readiness: Readiness,
    accept: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The served application, e.g. for [`App::reload_mount`] while running.
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// # Errors
    ///
    /// `TimedOut` when no test connection succeeds within the configured attempts.
    pub fn wait_ready(&self) -> io::Result<()> {
        let Readiness { attempts, interval } = self.readiness;
        for _ in 0..attempts {
            if TcpStream::connect_timeout(&self.addr, interval).is_ok() {
                return Ok(());
            }
            thread::sleep(interval);
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} not accepting after {attempts} attempts", self.addr),
        ))
    }

    pub fn stop(self) {
        // SAFETY: the accept coroutine owns nothing but its listener, which is
        // released when the cancellation unwinds it.
        unsafe {
            self.accept.coroutine().cancel();
        }
        // A cancelled coroutine joins as an unwind.
        drop(self.accept.join());
        info!(service = %self.app.service_name(), addr = %self.addr, "stopped");
    }

    /// Block until the accept loop ends.
    ///
    /// # Errors
    ///
    /// The panic payload if the accept loop panicked.
    pub fn join(self) -> thread::Result<()> {
        self.accept.join()
    }
}
