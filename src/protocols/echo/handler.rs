//! Echo protocol handler.

use crate::error::HandlerError;
use crate::runtime::{Handler, Session};
use tracing::trace;

/// Writes every data segment back to the peer.
#[derive(Debug, Default)]
pub struct EchoHandler {
    echoed: usize,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Handler for EchoHandler {
    fn on_data(&mut self, session: &mut Session, data: &[u8]) -> Result<(), HandlerError> {
        session.write(data)?;
        self.echoed += data.len();
        Ok(())
    }

    fn on_close(&mut self, session: &mut Session) {
        trace!(conn = session.id(), bytes = self.echoed, "Echo session finished");
    }
}
