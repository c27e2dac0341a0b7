//! Per-connection session state and the handler callback surface.
//!
//! A `Session` owns the accepted socket and its `FrameDecoder`. It lives on
//! the connection's own thread and is never shared, so nothing here locks.

use crate::error::{FramingError, HandlerError, SessionError};
use crate::runtime::decoder::{FrameDecoder, Terminator};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Read buffer size used by connection loops.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Read-only state shared by every session of a server.
#[derive(Debug, Clone)]
pub struct ServerContext {
    /// Display name sent as a greeting on connect, if any.
    pub app_name: Option<String>,
    /// Timeout applied to each read unless a session overrides it.
    pub read_timeout: Duration,
    /// Maximum bytes taken from the socket per read.
    pub read_buffer_size: usize,
}

impl Default for ServerContext {
    fn default() -> Self {
        Self {
            app_name: None,
            read_timeout: Duration::from_secs(40),
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}

/// One accepted connection.
pub struct Session {
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    pub(crate) decoder: FrameDecoder,
    close_requested: bool,
    timeout_override: Option<Duration>,
    context: Arc<ServerContext>,
}

impl Session {
    /// Wrap an accepted, blocking stream.
    pub fn new(id: u64, stream: TcpStream, peer: SocketAddr, context: Arc<ServerContext>) -> Self {
        Self {
            id,
            stream,
            peer,
            decoder: FrameDecoder::new(),
            close_requested: false,
            timeout_override: None,
            context,
        }
    }

    /// Connection id assigned by the acceptor.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address the connection was accepted on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Change how the stream is framed, starting with the next push.
    pub fn set_terminator(&mut self, terminator: Terminator) -> Result<(), FramingError> {
        self.decoder.set_terminator(terminator)
    }

    pub fn terminator(&self) -> &Terminator {
        self.decoder.terminator()
    }

    /// Drop bytes the decoder is holding back.
    pub fn discard_buffers(&mut self) {
        self.decoder.discard();
    }

    /// Ask the connection loop to close after the current callback.
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested
    }

    /// Use `timeout` for the next read only.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout_override = Some(timeout);
    }

    /// Timeout for the next read. Consumes any override.
    pub(crate) fn take_read_timeout(&mut self) -> Duration {
        self.timeout_override
            .take()
            .unwrap_or(self.context.read_timeout)
    }

    /// Write all of `data` to the peer, blocking until done.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    /// Send `"<app_name>\n"` if the server has a display name.
    pub fn send_greeting(&mut self) -> io::Result<()> {
        match self.context.app_name.clone() {
            Some(name) => self.write(format!("{name}\n").as_bytes()),
            None => Ok(()),
        }
    }

    /// Best-effort `-ERR <error>` notice to the peer.
    ///
    /// A failed write is logged and otherwise ignored.
    pub fn notify_error(&mut self, err: &SessionError) {
        debug!(conn = self.id, error = %err, "Sending error notice to client");
        let notice = format!("-ERR {err}\r\n");
        match self.write(notice.as_bytes()) {
            Ok(()) => debug!(conn = self.id, "Error notice sent"),
            Err(e) => warn!(conn = self.id, error = %e, "Unable to send error notice to client"),
        }
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Close both directions of the socket. Errors are ignored since the
    /// socket is dropped right after.
    pub(crate) fn shutdown(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// Callbacks for one connection.
///
/// Every method has a default, so a handler only implements what its
/// protocol needs. Returning an error from a callback ends the connection
/// through `on_error` and `on_close`.
pub trait Handler: Send {
    /// Called once before anything is read. Sends the greeting, if configured.
    fn on_connect(&mut self, session: &mut Session) -> Result<(), HandlerError> {
        session.send_greeting()?;
        Ok(())
    }

    /// A segment of frame content.
    fn on_data(&mut self, _session: &mut Session, _data: &[u8]) -> Result<(), HandlerError> {
        Ok(())
    }

    /// The data delivered since the last boundary is one complete frame.
    fn on_frame(&mut self, _session: &mut Session) -> Result<(), HandlerError> {
        Ok(())
    }

    /// The connection failed. Called at most once, before `on_close`.
    fn on_error(&mut self, session: &mut Session, err: &SessionError) {
        session.notify_error(err);
    }

    /// Called exactly once when the connection ends, on every path.
    fn on_close(&mut self, session: &mut Session) {
        debug!(conn = session.id(), "Ending TCP session");
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn on_connect(&mut self, session: &mut Session) -> Result<(), HandlerError> {
        (**self).on_connect(session)
    }

    fn on_data(&mut self, session: &mut Session, data: &[u8]) -> Result<(), HandlerError> {
        (**self).on_data(session, data)
    }

    fn on_frame(&mut self, session: &mut Session) -> Result<(), HandlerError> {
        (**self).on_frame(session)
    }

    fn on_error(&mut self, session: &mut Session, err: &SessionError) {
        (**self).on_error(session, err)
    }

    fn on_close(&mut self, session: &mut Session) {
        (**self).on_close(session)
    }
}

/// Creates one handler per accepted connection.
pub trait HandlerFactory: Send + Sync + 'static {
    type Handler: Handler + 'static;

    fn create(&self) -> Self::Handler;
}

impl<F, H> HandlerFactory for F
where
    F: Fn() -> H + Send + Sync + 'static,
    H: Handler + 'static,
{
    type Handler = H;

    fn create(&self) -> H {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn session_pair(context: ServerContext) -> (Session, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        (Session::new(7, stream, peer, Arc::new(context)), client)
    }

    struct Greeter;

    impl Handler for Greeter {}

    #[test]
    fn test_timeout_override_is_one_shot() {
        let (mut session, _client) = session_pair(ServerContext::default());

        session.set_timeout(Duration::from_secs(90));
        assert_eq!(session.take_read_timeout(), Duration::from_secs(90));
        assert_eq!(session.take_read_timeout(), Duration::from_secs(40));
    }

    #[test]
    fn test_request_close() {
        let (mut session, _client) = session_pair(ServerContext::default());
        assert!(!session.is_close_requested());
        session.request_close();
        assert!(session.is_close_requested());
    }

    #[test]
    fn test_set_terminator_validates() {
        let (mut session, _client) = session_pair(ServerContext::default());
        assert_eq!(
            session.set_terminator(Terminator::Delimiter(bytes::Bytes::new())),
            Err(FramingError::EmptyDelimiter)
        );
        session.set_terminator(Terminator::ByteCount(4)).unwrap();
        assert_eq!(session.terminator(), &Terminator::ByteCount(4));
    }

    #[test]
    fn test_default_greeting() {
        let context = ServerContext {
            app_name: Some("frames".to_string()),
            ..ServerContext::default()
        };
        let (mut session, mut client) = session_pair(context);

        Greeter.on_connect(&mut session).unwrap();

        let mut buf = [0u8; 7];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"frames\n");
    }

    #[test]
    fn test_error_notice() {
        let (mut session, mut client) = session_pair(ServerContext::default());

        let err = SessionError::Framing(FramingError::EmptyDelimiter);
        Greeter.on_error(&mut session, &err);
        session.shutdown();

        let mut received = String::new();
        client.read_to_string(&mut received).unwrap();
        assert_eq!(
            received,
            "-ERR framing error: delimiter terminator must not be empty\r\n"
        );
    }

    #[test]
    fn test_error_notice_failure_is_swallowed() {
        let (mut session, client) = session_pair(ServerContext::default());
        drop(client);
        session.shutdown();

        // Writing to a shut down socket fails; the notice must not panic
        session.notify_error(&SessionError::Timeout(Duration::from_secs(1)));
    }
}
