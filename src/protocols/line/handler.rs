//! Line protocol handler.

use crate::error::HandlerError;
use crate::protocols::line::parser::{self, Command, ParseResult};
use crate::runtime::{Handler, Session, Terminator};
use bytes::BytesMut;
use tracing::trace;

const LINE_DELIMITER: &[u8] = b"\r\n";
const MAX_LINE_LENGTH: usize = 1024;
const MAX_ECHO_SIZE: usize = 16 * 1024 * 1024; // 16MB max echo size

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Command,
    Payload,
}

/// Handles one line-protocol connection.
#[derive(Debug)]
pub struct LineHandler {
    frame: BytesMut,
    state: State,
}

impl Default for LineHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl LineHandler {
    pub fn new() -> Self {
        Self {
            frame: BytesMut::with_capacity(MAX_LINE_LENGTH),
            state: State::Command,
        }
    }

    fn expect_command(&mut self, session: &mut Session) -> Result<(), HandlerError> {
        session.set_terminator(Terminator::delimiter(LINE_DELIMITER)?)?;
        self.state = State::Command;
        Ok(())
    }

    fn handle_command(&mut self, session: &mut Session, line: &[u8]) -> Result<(), HandlerError> {
        match parser::parse(line) {
            ParseResult::Complete(Command::Ping) => session.write(parser::response_pong())?,
            ParseResult::Complete(Command::PingMsg(msg)) => {
                session.write(&parser::response_pong_msg(&msg))?
            }
            ParseResult::Complete(Command::Echo { length: 0 }) => {
                session.write(&parser::response_echo(b""))?
            }
            ParseResult::Complete(Command::Echo { length }) if length > MAX_ECHO_SIZE => {
                session.write(&parser::response_error("payload too large"))?
            }
            ParseResult::Complete(Command::Echo { length }) => {
                session.set_terminator(Terminator::ByteCount(length))?;
                // Give a slow payload twice the usual time, for one read only
                let timeout = session.context().read_timeout * 2;
                session.set_timeout(timeout);
                self.state = State::Payload;
                session.write(parser::response_go())?;
            }
            ParseResult::Complete(Command::Quit) => {
                session.write(parser::response_ok())?;
                session.request_close();
            }
            ParseResult::InvalidLength => {
                session.write(&parser::response_error("invalid length"))?
            }
            ParseResult::Unknown => session.write(&parser::response_error("unknown command"))?,
        }
        Ok(())
    }
}

impl Handler for LineHandler {
    fn on_connect(&mut self, session: &mut Session) -> Result<(), HandlerError> {
        session.send_greeting()?;
        self.expect_command(session)
    }

    fn on_data(&mut self, _session: &mut Session, data: &[u8]) -> Result<(), HandlerError> {
        if self.state == State::Command && self.frame.len() + data.len() > MAX_LINE_LENGTH {
            return Err(format!("command line longer than {MAX_LINE_LENGTH} bytes").into());
        }
        self.frame.extend_from_slice(data);
        Ok(())
    }

    fn on_frame(&mut self, session: &mut Session) -> Result<(), HandlerError> {
        let frame = self.frame.split();
        trace!(conn = session.id(), state = ?self.state, len = frame.len(), "Frame");

        match self.state {
            State::Command => self.handle_command(session, &frame),
            State::Payload => {
                session.write(&parser::response_echo(&frame))?;
                self.expect_command(session)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ConnectionLoop, ServerContext};
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::thread;

    /// Serve one connection with a fresh `LineHandler` on a background thread.
    fn serve_one(context: ServerContext) -> (TcpStream, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, peer) = listener.accept().unwrap();
            let session = Session::new(0, stream, peer, Arc::new(context));
            ConnectionLoop::new(session, LineHandler::new()).run();
        });

        (TcpStream::connect(addr).unwrap(), server)
    }

    fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line
    }

    #[test]
    fn test_ping_and_quit() {
        let (mut client, server) = serve_one(ServerContext::default());
        let mut reader = BufReader::new(client.try_clone().unwrap());

        client.write_all(b"PING\r\nPING there\r\nBOGUS\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "PONG\r\n");
        assert_eq!(read_line(&mut reader), "PONG there\r\n");
        assert_eq!(read_line(&mut reader), "ERROR unknown command\r\n");

        client.write_all(b"QUIT\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "OK\r\n");
        assert_eq!(read_line(&mut reader), "");

        server.join().unwrap();
    }

    #[test]
    fn test_greeting() {
        let context = ServerContext {
            app_name: Some("frames".to_string()),
            ..ServerContext::default()
        };
        let (mut client, server) = serve_one(context);
        let mut reader = BufReader::new(client.try_clone().unwrap());

        assert_eq!(read_line(&mut reader), "frames\n");
        client.write_all(b"QUIT\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "OK\r\n");

        server.join().unwrap();
    }

    #[test]
    fn test_echo_payload_in_pieces() {
        let (mut client, server) = serve_one(ServerContext::default());
        let mut reader = BufReader::new(client.try_clone().unwrap());

        client.write_all(b"ECHO 12\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "+GO\r\n");

        // Payload contains the delimiter; byte-count framing must ignore it
        client.write_all(b"hel").unwrap();
        client.flush().unwrap();
        thread::sleep(std::time::Duration::from_millis(20));
        client.write_all(b"lo\r\nworld").unwrap();

        let mut reply = [0u8; 18];
        reader.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"12\r\nhello\r\nworld\r\n");

        // Back in command mode
        client.write_all(b"PING\r\nQUIT\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "PONG\r\n");
        assert_eq!(read_line(&mut reader), "OK\r\n");

        server.join().unwrap();
    }

    #[test]
    fn test_payload_followed_by_command() {
        let (mut client, server) = serve_one(ServerContext::default());
        let mut reader = BufReader::new(client.try_clone().unwrap());

        client.write_all(b"ECHO 3\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "+GO\r\n");

        // The command after the payload arrives in the same segment
        client.write_all(b"abcQUIT\r\n").unwrap();
        assert_eq!(read_line(&mut reader), "3\r\n");
        assert_eq!(read_line(&mut reader), "abc\r\n");
        assert_eq!(read_line(&mut reader), "OK\r\n");

        server.join().unwrap();
    }

    #[test]
    fn test_overlong_line_fails_connection() {
        let (mut client, server) = serve_one(ServerContext::default());

        client.write_all(&vec![b'x'; MAX_LINE_LENGTH + 1]).unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        assert!(reply.starts_with("-ERR handler error: command line longer than"));

        server.join().unwrap();
    }
}
