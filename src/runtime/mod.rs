//! Thread-per-connection runtime.
//!
//! - `FrameDecoder`: splits a byte stream into frames
//! - `Session`: per-connection state and the `Handler` callbacks
//! - `ConnectionLoop`: blocking read loop for one session
//! - `Listener` / `Acceptor`: bound ports and the accept loop
//! - `ShutdownToken`: cooperative stop flag for the acceptor

mod connection;
mod decoder;
mod listener;
mod session;
mod shutdown;

pub use connection::{ConnState, ConnectionLoop};
pub use decoder::{Event, FrameDecoder, Terminator};
pub use listener::{Acceptor, Listener};
pub use session::{Handler, HandlerFactory, ServerContext, Session, READ_BUFFER_SIZE};
pub use shutdown::ShutdownToken;
