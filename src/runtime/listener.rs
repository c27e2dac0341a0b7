//! Listening sockets and the accept loop.
//!
//! The `Listener` binds a contiguous range of ports. The `Acceptor` waits on
//! all of them with a single mio `Poll`, bounded by the poll interval so the
//! shutdown token is rechecked even when no client connects. Each accepted
//! connection gets its own detached thread running a `ConnectionLoop`.

use crate::error::{ConfigError, ServerError};
use crate::runtime::connection::ConnectionLoop;
use crate::runtime::session::{HandlerFactory, ServerContext, Session};
use crate::runtime::shutdown::ShutdownToken;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Listen backlog for each socket.
const BACKLOG: i32 = 1024;

/// A set of bound, non-blocking listening sockets.
#[derive(Debug)]
pub struct Listener {
    sockets: Vec<TcpListener>,
}

impl Listener {
    /// Bind `count` consecutive ports starting at `base_port`.
    ///
    /// A `count` of zero binds one port. With `base_port` 0 every socket
    /// gets its own ephemeral port.
    pub fn bind(addr: IpAddr, base_port: u16, count: u16) -> Result<Self, ServerError> {
        let count = count.max(1);
        if base_port != 0 && u32::from(base_port) + u32::from(count) - 1 > u32::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "port range {base_port}+{count} exceeds {}",
                u16::MAX
            ))
            .into());
        }

        let mut sockets = Vec::with_capacity(usize::from(count));
        for i in 0..count {
            let port = if base_port == 0 { 0 } else { base_port + i };
            let addr = SocketAddr::new(addr, port);
            let socket =
                create_listener(addr).map_err(|source| ServerError::Bind { addr, source })?;
            sockets.push(socket);
        }

        Ok(Self { sockets })
    }

    /// Addresses actually bound, in port order.
    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.sockets.iter().map(TcpListener::local_addr).collect()
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Accept one pending connection from socket `idx`.
    fn accept(&self, idx: usize) -> io::Result<(TcpStream, SocketAddr)> {
        match self.sockets.get(idx) {
            Some(socket) => socket.accept(),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "unknown listener token")),
        }
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
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
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}

/// Accept loop over every socket of a `Listener`.
pub struct Acceptor<F: HandlerFactory> {
    listener: Listener,
    poll: Poll,
    factory: F,
    context: Arc<ServerContext>,
    shutdown: ShutdownToken,
    poll_interval: Duration,
    next_conn_id: u64,
}

impl<F: HandlerFactory> Acceptor<F> {
    /// Register the listener's sockets for readiness.
    pub fn new(
        listener: Listener,
        factory: F,
        context: ServerContext,
        shutdown: ShutdownToken,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        for (idx, socket) in listener.sockets.iter().enumerate() {
            poll.registry().register(
                &mut SourceFd(&socket.as_raw_fd()),
                Token(idx),
                Interest::READABLE,
            )?;
        }

        Ok(Self {
            listener,
            poll,
            factory,
            context: Arc::new(context),
            shutdown,
            poll_interval,
            next_conn_id: 0,
        })
    }

    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.listener.local_addrs()
    }

    /// Accept connections until the shutdown token is set, then close every
    /// listening socket.
    pub fn run(mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(self.listener.len().max(16));

        for addr in self.listener.local_addrs()? {
            info!(
                port = addr.port(),
                name = self.context.app_name.as_deref().unwrap_or("-"),
                "Listening"
            );
        }

        let result = loop {
            if self.shutdown.is_shutdown() {
                break Ok(());
            }

            match self.poll.poll(&mut events, Some(self.poll_interval)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }

            if self.shutdown.is_shutdown() {
                break Ok(());
            }

            for event in events.iter() {
                let Token(idx) = event.token();
                self.accept_ready(idx);
            }
        };

        self.close();
        result
    }

    /// Drain pending connections on one ready socket.
    fn accept_ready(&mut self, idx: usize) {
        loop {
            match self.listener.accept(idx) {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if is_transient_accept_error(e) => {
                    warn!(listener = idx, error = %e, "Skipping failed connection");
                }
                Err(e) => {
                    error!(listener = idx, error = %e, "Accept error");
                    break;
                }
            }
        }
    }

    /// Start a detached thread for the connection.
    fn spawn_connection(&mut self, stream: TcpStream, peer: SocketAddr) {
        // Accepted sockets may inherit O_NONBLOCK from the listener
        if let Err(e) = stream.set_nonblocking(false) {
            warn!(peer = %peer, error = %e, "Dropping connection");
            return;
        }

        let id = self.next_conn_id;
        self.next_conn_id += 1;

        let handler = self.factory.create();
        let context = Arc::clone(&self.context);

        let spawned = thread::Builder::new()
            .name(format!("conn-{id}"))
            .spawn(move || {
                match stream.local_addr() {
                    Ok(local) => info!(conn = id, peer = %peer, local = %local, "Incoming connection"),
                    Err(_) => info!(conn = id, peer = %peer, "Incoming connection"),
                }
                let session = Session::new(id, stream, peer, context);
                ConnectionLoop::new(session, handler).run();
            });

        if let Err(e) = spawned {
            error!(conn = id, peer = %peer, error = %e, "Failed to spawn connection thread");
        }
    }

    /// Deregister and drop every listening socket. Errors are ignored.
    fn close(&mut self) {
        for socket in self.listener.sockets.drain(..) {
            let _ = self
                .poll
                .registry()
                .deregister(&mut SourceFd(&socket.as_raw_fd()));
            if let Ok(addr) = socket.local_addr() {
                debug!(addr = %addr, "Closing listener");
            }
        }
        info!("Acceptor stopped");
    }
}

/// Accept failures that concern one pending connection only. The socket
/// keeps accepting after these.
fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::PermissionDenied
    )
}
