//! mio event loop driving connection framers.
//!
//! Readiness-based model with one `Poll` per worker thread. Each worker owns
//! an `SO_REUSEPORT` listener so the kernel spreads accepts across workers.
//! mio readiness is edge-triggered while the framer expects level-triggered
//! readiness, so each event steps the framer until it stops making progress.

use crate::config::Config;
use crate::runtime::connection::{ConnectionFramer, ConnectionRegistry, Liveness};
use crate::runtime::handler::RequestHandler;
use crate::runtime::transport::SocketTransport;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const WAKER_TOKEN: Token = Token(usize::MAX - 1);
const EVENTS_CAPACITY: usize = 1024;

type MioConnection<H> = ConnectionFramer<SocketTransport<TcpStream>, H>;

/// Per-worker connection settings, copied out of [`Config`].
#[derive(Debug, Clone, Copy)]
struct WorkerSettings {
    max_connections: usize,
    recv_size: usize,
    idle_timeout: Duration,
}

/// HTTP endpoint bound to a configured address.
pub struct Server<H> {
    config: Config,
    handler: Arc<H>,
}

impl<H> Server<H>
where
    H: RequestHandler + Send + Sync + 'static,
{
    pub fn new(config: Config, handler: Arc<H>) -> Self {
        Self { config, handler }
    }

    /// Bind listeners and spawn workers.
    ///
    /// The returned handle owns the workers: dropping it (or calling
    /// [`ServerHandle::stop`]) shuts them down and releases the sockets.
    pub fn start(&self) -> io::Result<ServerHandle> {
        let num_workers = self
            .config
            .workers
            .filter(|&n| n > 0)
            .unwrap_or_else(num_cpus);

        let addr = resolve(&self.config.listen)?;
        let first = create_listener_with_reuseport(addr)?;
        // Resolves port 0; the remaining workers share the concrete port.
        let local_addr = first.local_addr()?;

        let settings = WorkerSettings {
            max_connections: self.config.max_connections,
            recv_size: self.config.recv_size,
            idle_timeout: self.config.idle_timeout,
        };

        let mut handle = ServerHandle {
            local_addr,
            shutdown: Arc::new(AtomicBool::new(false)),
            wakers: Vec::with_capacity(num_workers),
            workers: Vec::with_capacity(num_workers),
        };

        let mut first = Some(first);
        for worker_id in 0..num_workers {
            let listener = match first.take() {
                Some(listener) => listener,
                None => create_listener_with_reuseport(local_addr)?,
            };

            let poll = Poll::new()?;
            let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
            let handler = Arc::clone(&self.handler);
            let shutdown = Arc::clone(&handle.shutdown);

            let worker = thread::Builder::new()
                .name(format!("worker-{worker_id}"))
                .spawn(move || {
                    if let Err(e) =
                        worker_loop(worker_id, poll, listener, settings, handler, &shutdown)
                    {
                        error!(worker = worker_id, error = %e, "Worker failed");
                    }
                })?;

            handle.wakers.push(waker);
            handle.workers.push(worker);
        }

        info!(
            workers = num_workers,
            addr = %local_addr,
            recv_size = settings.recv_size,
            idle_timeout_ms = settings.idle_timeout.as_millis() as u64,
            "Server started"
        );

        Ok(handle)
    }
}

/// Running server. Stops and joins its workers when dropped.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    wakers: Vec<Waker>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the listeners are bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal every worker to exit and wait for them.
    pub fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.shutdown.store(true, Ordering::Release);
        for waker in &self.wakers {
            if let Err(e) = waker.wake() {
                warn!(error = %e, "Failed to wake worker");
            }
        }
        self.join();
        info!(addr = %self.local_addr, "Server stopped");
    }

    /// Block until every worker exits.
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<H>(
    worker_id: usize,
    mut poll: Poll,
    listener: std::net::TcpListener,
    settings: WorkerSettings,
    handler: Arc<H>,
    shutdown: &AtomicBool,
) -> io::Result<()>
where
    H: RequestHandler,
{
    let mut events = Events::with_capacity(EVENTS_CAPACITY);

    let mut listener = TcpListener::from_std(listener);
    poll.registry()
        .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

    let mut connections: ConnectionRegistry<MioConnection<H>> =
        ConnectionRegistry::new(settings.max_connections);

    debug!(
        worker = worker_id,
        max_connections = settings.max_connections,
        "Worker started"
    );

    while !shutdown.load(Ordering::Acquire) {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }

        for event in events.iter() {
            match event.token() {
                WAKER_TOKEN => {}
                LISTENER_TOKEN => {
                    accept_connections(&listener, &poll, &mut connections, &handler, settings, worker_id);
                }
                Token(conn_id) => {
                    drive_connection(conn_id, &mut connections, settings.recv_size);
                }
            }
        }
    }

    debug!(worker = worker_id, open = connections.len(), "Worker stopping");
    Ok(())
}

fn accept_connections<H>(
    listener: &TcpListener,
    poll: &Poll,
    connections: &mut ConnectionRegistry<MioConnection<H>>,
    handler: &Arc<H>,
    settings: WorkerSettings,
    worker_id: usize,
) where
    H: RequestHandler,
{
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if connections.is_full() {
                    warn!(worker = worker_id, peer = %peer_addr, "Connection limit reached");
                    continue;
                }

                if let Err(e) = admit(stream, poll, connections, handler, settings) {
                    error!(worker = worker_id, peer = %peer_addr, error = %e, "Register error");
                    continue;
                }

                debug!(
                    worker = worker_id,
                    peer = %peer_addr,
                    open = connections.len(),
                    "Accepted connection"
                );
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                error!("Accept error: {}", e);
                break;
            }
        }
    }
}

/// Register an accepted stream and add its framer to the registry.
///
/// On error the stream is dropped, which closes it.
fn admit<H>(
    mut stream: TcpStream,
    poll: &Poll,
    connections: &mut ConnectionRegistry<MioConnection<H>>,
    handler: &Arc<H>,
    settings: WorkerSettings,
) -> io::Result<usize>
where
    H: RequestHandler,
{
    let conn_id = connections.vacant_key();
    poll.registry().register(
        &mut stream,
        Token(conn_id),
        Interest::READABLE | Interest::WRITABLE,
    )?;

    let conn = ConnectionFramer::new(
        SocketTransport::new(stream),
        Arc::clone(handler),
        settings.idle_timeout,
    );
    connections
        .insert(conn)
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "connection registry full"))
}

/// Step a connection until it closes or an extra step changes nothing.
fn drive_connection<H>(
    conn_id: usize,
    connections: &mut ConnectionRegistry<MioConnection<H>>,
    recv_size: usize,
) where
    H: RequestHandler,
{
    let conn = match connections.get_mut(conn_id) {
        Some(conn) => conn,
        None => return,
    };

    trace!(conn_id, state = ?conn.state(), "Connection event");

    loop {
        let pending = conn.pending_write();
        if conn.advance(recv_size) == Liveness::Closed {
            connections.remove(conn_id);
            debug!(conn_id, "Connection closed");
            return;
        }

        // Keep flushing while the socket accepts bytes; the next writable
        // edge resumes a response the socket could not take yet.
        if conn.pending_write() == 0 || conn.pending_write() == pending {
            break;
        }
    }
}

fn resolve(listen: &str) -> io::Result<SocketAddr> {
    listen.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("listen address '{listen}' did not resolve"),
        )
    })
}

/// Create a TCP listener with SO_REUSEPORT for kernel load balancing.
fn create_listener_with_reuseport(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_port(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
