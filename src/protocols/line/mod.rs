//! Line protocol implementation.
//!
//! CRLF-delimited commands, with an inline length-prefixed payload that is
//! read as a single byte-count frame:
//!
//! ```text
//! PING            -> PONG
//! PING <msg>      -> PONG <msg>
//! ECHO <n>        -> +GO          (client then sends exactly n bytes)
//! <n bytes>       -> <n>\r\n<data>\r\n
//! QUIT            -> OK           (server closes)
//! anything else   -> ERROR unknown command
//! ```
//!
//! The client must wait for `+GO` before sending the payload. Bytes already
//! sent behind the `ECHO` line were framed as command data.

pub mod handler;
pub mod parser;

pub use handler::LineHandler;
