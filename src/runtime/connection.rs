//! Connection loop driving one session.
//!
//! ```text
//! Connected -> Reading -> (Dispatching -> Reading)* -> Closing -> Closed
//! ```
//!
//! The loop runs on the connection's own thread and performs blocking reads
//! bounded by the session's read timeout. Every exit path goes through
//! `Closing`, which calls `Handler::on_close` exactly once and releases the
//! socket.

use crate::error::SessionError;
use crate::runtime::decoder::Event;
use crate::runtime::session::{Handler, Session};
use std::io::{self, Read};
use tracing::{debug, trace, warn};

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accepted, `on_connect` not yet run.
    Connected,
    /// Blocked in a read.
    Reading,
    /// Delivering decoder events to the handler.
    Dispatching,
    /// Running `on_close` and releasing the socket.
    Closing,
    /// Terminal.
    Closed,
}

/// Drives a `Session` from accept to close.
pub struct ConnectionLoop<H: Handler> {
    session: Session,
    handler: H,
    state: ConnState,
}

impl<H: Handler> ConnectionLoop<H> {
    pub fn new(session: Session, handler: H) -> Self {
        Self {
            session,
            handler,
            state: ConnState::Connected,
        }
    }

    /// Run the connection to completion and return the handler.
    pub fn run(mut self) -> H {
        if let Err(err) = self.drive() {
            warn!(conn = self.session.id(), peer = %self.session.peer_addr(), error = %err, "Session failed");
            self.handler.on_error(&mut self.session, &err);
        }

        self.transition(ConnState::Closing);
        self.handler.on_close(&mut self.session);
        self.session.shutdown();
        self.transition(ConnState::Closed);

        debug!(conn = self.session.id(), "Connection closed");
        self.handler
    }

    fn drive(&mut self) -> Result<(), SessionError> {
        // Handler writes block at most this long when the peer stops reading
        let write_timeout = self.session.context().read_timeout;
        self.session
            .stream_mut()
            .set_write_timeout(Some(write_timeout))?;

        let result = self.handler.on_connect(&mut self.session);
        result.map_err(|e| SessionError::from_handler(e, write_timeout))?;

        let mut buf = vec![0u8; self.session.context().read_buffer_size];

        loop {
            if self.session.is_close_requested() {
                trace!(conn = self.session.id(), "Close requested");
                return Ok(());
            }

            self.transition(ConnState::Reading);
            let n = self.read(&mut buf)?;
            if n == 0 {
                trace!(conn = self.session.id(), "Connection closed by peer");
                return Ok(());
            }

            self.transition(ConnState::Dispatching);
            let events = self.session.decoder.push(&buf[..n])?;
            self.dispatch(events)?;

            // Bytes held after a byte-count frame are classified under the
            // terminator the handler set while dispatching
            while !self.session.is_close_requested() && self.session.decoder.pending() > 0 {
                let events = self.session.decoder.resume()?;
                if events.is_empty() {
                    break;
                }
                self.dispatch(events)?;
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        let timeout = self.session.take_read_timeout();
        self.session.stream_mut().set_read_timeout(Some(timeout))?;

        loop {
            match self.session.stream_mut().read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SessionError::from_read(e, timeout)),
            }
        }
    }

    /// Deliver events in order, stopping as soon as close is requested.
    fn dispatch(&mut self, events: Vec<Event>) -> Result<(), SessionError> {
        for event in events {
            let result = match event {
                Event::Data(data) => self.handler.on_data(&mut self.session, &data),
                Event::FrameComplete => self.handler.on_frame(&mut self.session),
            };
            let write_timeout = self.session.context().read_timeout;
            result.map_err(|e| SessionError::from_handler(e, write_timeout))?;

            if self.session.is_close_requested() {
                break;
            }
        }
        Ok(())
    }

    fn transition(&mut self, state: ConnState) {
        trace!(conn = self.session.id(), from = ?self.state, to = ?state, "State change");
        self.state = state;
    }
}
