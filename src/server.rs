//! Connection dispatcher.
//!
//! Binds the listening socket, accepts connections in a loop, and hands
//! each one to a freshly spawned worker thread. Workers are never joined:
//! once the accept loop stops, the process may exit while they still run.

use crate::config::Config;
use crate::connection::{self, Connection};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

const EVENT_CAPACITY: usize = 64;

/// Server instance
pub struct Server {
    config: Config,
    listener: TcpListener,
    local_addr: SocketAddr,
    poll: Poll,
    shutdown: ShutdownHandle,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the listening socket and prepare the accept loop.
    pub fn bind(config: Config) -> Result<Self, ServerError> {
        let address = config.listen_address();
        let addr = resolve(&address).map_err(|e| ServerError::Bind(address.clone(), e))?;
        let listener =
            create_listener(addr, config.backlog).map_err(|e| ServerError::Bind(address, e))?;
        let local_addr = listener.local_addr().map_err(ServerError::Register)?;

        let poll = Poll::new().map_err(ServerError::Register)?;
        poll.registry()
            .register(
                &mut SourceFd(&listener.as_raw_fd()),
                LISTENER_TOKEN,
                Interest::READABLE,
            )
            .map_err(ServerError::Register)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(ServerError::Register)?;

        Ok(Server {
            config,
            listener,
            local_addr,
            poll,
            shutdown: ShutdownHandle {
                stopped: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that stops [`Server::run`] from any thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown is requested, then close the listener.
    pub fn run(mut self) -> Result<(), ServerError> {
        info!(
            address = %self.local_addr,
            protocol = ?self.config.protocol,
            "Server listening, waiting for connections"
        );

        let mut events = Events::with_capacity(EVENT_CAPACITY);

        while !self.shutdown.is_triggered() {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ServerError::Poll(e));
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_pending(),
                    WAKER_TOKEN => debug!("Accept loop woken"),
                    token => debug!(?token, "Unexpected event"),
                }
            }
        }

        info!("Server shutting down");
        if let Err(e) = self
            .poll
            .registry()
            .deregister(&mut SourceFd(&self.listener.as_raw_fd()))
        {
            debug!(error = %e, "Failed to deregister listener");
        }
        Ok(())
    }

    /// Drain every connection waiting in the accept queue.
    fn accept_pending(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    return;
                }
            }
        }
    }

    /// Spawn a worker thread owning the accepted stream.
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let Some(slot) = ConnectionSlot::acquire(&self.active, self.config.max_connections)
        else {
            warn!(peer = %peer, "Connection limit reached");
            return;
        };

        info!(peer = %peer, active = slot.active(), "Accepted connection");

        let conn = match Connection::new(stream, peer) {
            Ok(conn) => conn,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to prepare connection");
                return;
            }
        };

        let protocol = self.config.protocol;
        let buffer_size = self.config.buffer_size;

        let spawned = thread::Builder::new()
            .name(format!("conn-{peer}"))
            .spawn(move || {
                let _slot = slot;
                connection::serve(conn, protocol, buffer_size);
            });

        if let Err(e) = spawned {
            error!(peer = %peer, error = %e, "Failed to spawn worker");
        }
    }
}

/// Stops a running [`Server`].
#[derive(Clone)]
pub struct ShutdownHandle {
    stopped: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Request shutdown and wake the accept loop.
    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            error!(error = %e, "Failed to wake accept loop");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Counts a running worker against the connection cap.
///
/// Released on drop, so the count stays right however the worker exits.
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    /// Take a slot, or `None` if `max` workers are already running.
    /// A `max` of 0 means unbounded.
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (max == 0 || current < max).then_some(current + 1)
            })
            .ok()?;
        Some(ConnectionSlot {
            active: Arc::clone(active),
        })
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

fn resolve(address: &str) -> io::Result<SocketAddr> {
    address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no address resolved for {address}"),
        )
    })
}

fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

/// Server errors
#[derive(Debug)]
pub enum ServerError {
    Bind(String, io::Error),
    Register(io::Error),
    Poll(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind(address, e) => write!(f, "Failed to bind {address}: {e}"),
            ServerError::Register(e) => write!(f, "Failed to set up accept loop: {e}"),
            ServerError::Poll(e) => write!(f, "Accept loop poll failed: {e}"),
        }
    }
}

impl std::error::Error for ServerError {}
