//! Echo protocol implementation.
//!
//! Framing is disabled: every segment read from the socket is written back
//! unchanged. Useful for raw I/O throughput testing and as the smallest
//! possible handler.
//!
//! ```text
//! Request:  <any bytes>
//! Response: <the same bytes>
//! ```

pub mod handler;

pub use handler::EchoHandler;
