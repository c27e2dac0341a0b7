//! Protocol handlers shipped with the server binary.
//!
//! - `echo`: raw echo, framing disabled
//! - `line`: CRLF-delimited commands with length-prefixed payloads

pub mod echo;
pub mod line;
