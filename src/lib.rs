//! tcp-frames: a scaffold for line/frame oriented TCP servers.
//!
//! Connections are accepted on one or more ports and each one runs on its
//! own thread with a `Handler` receiving framed input. Framing is chosen per
//! connection, and may change at any time, through a `Terminator`:
//! raw passthrough, a fixed byte count, or a literal delimiter.
//!
//! ```ignore
//! use tcp_frames::config::Config;
//! use tcp_frames::protocols::line::LineHandler;
//! use tcp_frames::runtime::ShutdownToken;
//! use tcp_frames::server::Server;
//!
//! let config = Config::load()?;
//! let shutdown = ShutdownToken::new();
//! shutdown.register_signals()?;
//! Server::bind(&config, LineHandler::new, shutdown)?.run()?;
//! ```

pub mod config;
pub mod error;
pub mod protocols;
pub mod runtime;
pub mod server;

pub use error::{FramingError, HandlerError, ServerError, SessionError};
pub use runtime::{Event, FrameDecoder, Handler, Session, Terminator};
