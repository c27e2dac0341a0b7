//! tcp-frames: a thread-per-connection framed TCP server
//!
//! Serves one of the bundled protocols:
//! - `echo`: raw echo
//! - `line`: CRLF commands with length-prefixed payloads
//!
//! Configuration via CLI arguments or TOML file. SIGINT/SIGTERM stop the
//! accept loop within one poll interval.

use tcp_frames::config::{Config, ProtocolType};
use tcp_frames::protocols::echo::EchoHandler;
use tcp_frames::protocols::line::LineHandler;
use tcp_frames::runtime::{Handler, ShutdownToken};
use tcp_frames::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(false)
        .init();

    info!(
        bind = %config.bind,
        port = config.port,
        port_count = config.port_count,
        protocol = ?config.protocol,
        read_timeout = ?config.read_timeout,
        "Starting tcp-frames server"
    );

    let shutdown = ShutdownToken::new();
    shutdown.register_signals()?;

    let protocol = config.protocol;
    let factory = move || -> Box<dyn Handler> {
        match protocol {
            ProtocolType::Echo => Box::new(EchoHandler::new()),
            ProtocolType::Line => Box::new(LineHandler::new()),
        }
    };

    Server::bind(&config, factory, shutdown)?.run()?;
    Ok(())
}
