//! TCP server front end.
//!
//! Binds the configured port range and runs the accept loop until the
//! shutdown token is set.

use crate::config::Config;
use crate::error::ServerError;
use crate::runtime::{Acceptor, HandlerFactory, Listener, ShutdownToken};
use std::net::SocketAddr;
use tracing::info;

/// Server instance
pub struct Server<F: HandlerFactory> {
    acceptor: Acceptor<F>,
}

impl<F: HandlerFactory> Server<F> {
    /// Bind every configured port. Fails without serving if any bind fails.
    pub fn bind(config: &Config, factory: F, shutdown: ShutdownToken) -> Result<Self, ServerError> {
        let listener = Listener::bind(config.bind, config.port, config.port_count)?;
        let acceptor = Acceptor::new(
            listener,
            factory,
            config.context(),
            shutdown,
            config.poll_interval,
        )?;

        Ok(Server { acceptor })
    }

    pub fn local_addrs(&self) -> Result<Vec<SocketAddr>, ServerError> {
        Ok(self.acceptor.local_addrs()?)
    }

    /// Accept connections until shutdown is requested.
    ///
    /// Connections still running when this returns are not waited for.
    pub fn run(self) -> Result<(), ServerError> {
        self.acceptor.run()?;
        info!("Server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, TomlConfig};
    use crate::protocols::line::LineHandler;
    use clap::Parser;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;
    use std::thread;

    fn test_config() -> Config {
        let cli = CliArgs::parse_from([
            "tcp-frames",
            "--bind",
            "127.0.0.1",
            "--port",
            "0",
            "--port-count",
            "2",
            "--poll-interval-ms",
            "100",
            "--app-name",
            "frames",
        ]);
        Config::resolve(cli, TomlConfig::default()).unwrap()
    }

    #[test]
    fn test_serves_line_protocol_on_all_ports() {
        let shutdown = ShutdownToken::new();
        let server = Server::bind(&test_config(), LineHandler::new, shutdown.clone()).unwrap();
        let addrs = server.local_addrs().unwrap();
        assert_eq!(addrs.len(), 2);
        let handle = thread::spawn(move || server.run());

        for addr in addrs {
            let mut client = TcpStream::connect(addr).unwrap();
            let mut reader = BufReader::new(client.try_clone().unwrap());
            let mut line = String::new();

            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "frames\n");

            client.write_all(b"PING\r\n").unwrap();
            line.clear();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "PONG\r\n");
        }

        shutdown.shutdown();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_bind_failure_is_fatal() {
        let shutdown = ShutdownToken::new();
        let first = Server::bind(&test_config(), LineHandler::new, shutdown.clone()).unwrap();
        let taken = first.local_addrs().unwrap()[0];

        let mut config = test_config();
        config.port = taken.port();
        config.port_count = 1;
        let result = Server::bind(&config, LineHandler::new, shutdown);
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }
}
