//! Incremental frame decoder.
//!
//! Turns an arbitrarily chunked byte stream into data segments and frame
//! boundaries. The active [`Terminator`] decides where a frame ends:
//!
//! ```text
//! None            every chunk passes straight through as Data
//! ByteCount(n)    n bytes (across any number of reads) form one frame
//! Delimiter(s)    bytes up to the first `s` form one frame, `s` is dropped
//! ```
//!
//! For delimiters, a trailing run of bytes that could still be the start of
//! the delimiter is held back until the next push, so a delimiter split
//! across reads is neither lost nor leaked into the data.

use crate::error::FramingError;
use bytes::{Buf, Bytes, BytesMut};

/// Initial capacity of the retained buffer.
const INITIAL_BUFFER_SIZE: usize = 256;

/// Rule that defines frame boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Terminator {
    /// Framing disabled.
    #[default]
    None,
    /// Exactly this many bytes form one frame.
    ByteCount(usize),
    /// Frames end at the first occurrence of this byte string.
    Delimiter(Bytes),
}

impl Terminator {
    /// Build a delimiter terminator, rejecting the empty delimiter.
    pub fn delimiter(delim: impl Into<Bytes>) -> Result<Self, FramingError> {
        let term = Terminator::Delimiter(delim.into());
        term.validate()?;
        Ok(term)
    }

    /// Check that the terminator can be used for decoding.
    pub fn validate(&self) -> Result<(), FramingError> {
        match self {
            Terminator::Delimiter(delim) if delim.is_empty() => Err(FramingError::EmptyDelimiter),
            _ => Ok(()),
        }
    }
}

/// Output of the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Frame content, possibly partial. The caller accumulates these.
    Data(Bytes),
    /// Everything delivered since the previous boundary is one frame.
    FrameComplete,
}

/// Incremental decoder owned by a single session.
#[derive(Debug)]
pub struct FrameDecoder {
    terminator: Terminator,
    /// Bytes received but not yet delivered.
    buffer: BytesMut,
    /// Bytes left in the current byte-count frame.
    remaining: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with framing disabled.
    pub fn new() -> Self {
        Self {
            terminator: Terminator::None,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            remaining: 0,
        }
    }

    /// Create a decoder with the given terminator.
    pub fn with_terminator(terminator: Terminator) -> Result<Self, FramingError> {
        let mut decoder = Self::new();
        decoder.set_terminator(terminator)?;
        Ok(decoder)
    }

    /// Replace the active terminator.
    ///
    /// Validation happens here, before any byte is classified under the new
    /// rule. Setting a `ByteCount` (even the same one) starts a fresh frame.
    pub fn set_terminator(&mut self, terminator: Terminator) -> Result<(), FramingError> {
        terminator.validate()?;
        self.remaining = match terminator {
            Terminator::ByteCount(n) => n,
            _ => 0,
        };
        self.terminator = terminator;
        Ok(())
    }

    /// The active terminator.
    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    /// Number of bytes held back from the last push.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any held bytes.
    pub fn discard(&mut self) {
        self.buffer.clear();
    }

    /// Feed a chunk read from the stream.
    ///
    /// The whole chunk is classified under the terminator that is active
    /// when the call starts. An empty chunk produces no events.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Event>, FramingError> {
        let mut events = Vec::new();
        if chunk.is_empty() {
            return Ok(events);
        }

        if self.terminator == Terminator::None && self.buffer.is_empty() {
            events.push(Event::Data(Bytes::copy_from_slice(chunk)));
            return Ok(events);
        }

        self.buffer.extend_from_slice(chunk);
        self.classify(&mut events)?;
        Ok(events)
    }

    /// Classify held bytes under the current terminator.
    ///
    /// Bytes that follow a completed byte-count frame stay held until the
    /// terminator is replaced; calling this afterwards delivers them without
    /// waiting for another read.
    pub fn resume(&mut self) -> Result<Vec<Event>, FramingError> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            self.classify(&mut events)?;
        }
        Ok(events)
    }

    fn classify(&mut self, events: &mut Vec<Event>) -> Result<(), FramingError> {
        match &self.terminator {
            Terminator::None => {
                events.push(Event::Data(self.buffer.split().freeze()));
            }
            Terminator::ByteCount(_) => {
                if self.remaining == 0 {
                    return Err(FramingError::ByteCountExhausted {
                        pending: self.buffer.len(),
                    });
                }
                let take = self.remaining.min(self.buffer.len());
                events.push(Event::Data(self.buffer.split_to(take).freeze()));
                self.remaining -= take;
                if self.remaining == 0 {
                    events.push(Event::FrameComplete);
                }
            }
            Terminator::Delimiter(delim) => {
                let delim = delim.clone();
                loop {
                    if let Some(pos) = find(&self.buffer, &delim) {
                        if pos > 0 {
                            events.push(Event::Data(self.buffer.split_to(pos).freeze()));
                        }
                        events.push(Event::FrameComplete);
                        self.buffer.advance(delim.len());
                        continue;
                    }

                    // Hold back the longest tail that may begin the delimiter
                    let keep = partial_match(&self.buffer, &delim);
                    let deliver = self.buffer.len() - keep;
                    if deliver > 0 {
                        events.push(Event::Data(self.buffer.split_to(deliver).freeze()));
                    }
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Leftmost occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Length of the longest proper prefix of `delim` that ends `buffer`.
fn partial_match(buffer: &[u8], delim: &[u8]) -> usize {
    (1..delim.len())
        .rev()
        .find(|&k| buffer.ends_with(&delim[..k]))
        .unwrap_or(0)
}
