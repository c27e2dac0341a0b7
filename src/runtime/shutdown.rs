//! Cooperative shutdown flag.
//!
//! The acceptor polls the token between readiness waits; nothing is
//! interrupted. In-flight connections are not drained.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, thread-safe shutdown request.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Safe to call from any thread, any number of times.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Set the token when the process receives SIGINT or SIGTERM.
    pub fn register_signals(&self) -> io::Result<()> {
        use signal_hook::consts::signal::{SIGINT, SIGTERM};
        use signal_hook::flag;

        flag::register(SIGINT, Arc::clone(&self.flag))?;
        flag::register(SIGTERM, Arc::clone(&self.flag))?;
        Ok(())
    }
}
