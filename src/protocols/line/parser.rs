//! Line protocol parser.
//!
//! Operates on one complete command line, delimiter already stripped.

/// Parsed line command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Simple ping (no message).
    Ping,
    /// Ping with a message to echo back.
    PingMsg(Vec<u8>),
    /// Echo a payload of `length` bytes that follows.
    Echo { length: usize },
    /// Quit command.
    Quit,
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    Complete(Command),
    /// `ECHO` with a missing or non-numeric length.
    InvalidLength,
    /// Unknown command.
    Unknown,
}

/// Parse a command line.
pub fn parse(line: &[u8]) -> ParseResult {
    if line.eq_ignore_ascii_case(b"PING") {
        ParseResult::Complete(Command::Ping)
    } else if line.eq_ignore_ascii_case(b"QUIT") {
        ParseResult::Complete(Command::Quit)
    } else if line.len() > 5 && line[..5].eq_ignore_ascii_case(b"PING ") {
        ParseResult::Complete(Command::PingMsg(line[5..].to_vec()))
    } else if line.eq_ignore_ascii_case(b"ECHO") {
        ParseResult::InvalidLength
    } else if line.len() >= 5 && line[..5].eq_ignore_ascii_case(b"ECHO ") {
        parse_length(&line[5..])
    } else {
        ParseResult::Unknown
    }
}

fn parse_length(digits: &[u8]) -> ParseResult {
    match std::str::from_utf8(digits).ok().and_then(|s| s.parse().ok()) {
        Some(length) => ParseResult::Complete(Command::Echo { length }),
        None => ParseResult::InvalidLength,
    }
}

/// Format a PONG response.
pub fn response_pong() -> &'static [u8] {
    b"PONG\r\n"
}

/// Format a PONG response with message.
pub fn response_pong_msg(msg: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + msg.len() + 2);
    out.extend_from_slice(b"PONG ");
    out.extend_from_slice(msg);
    out.extend_from_slice(b"\r\n");
    out
}

/// Ready-for-payload response.
pub fn response_go() -> &'static [u8] {
    b"+GO\r\n"
}

/// Format an echo response: `<length>\r\n<data>\r\n`.
pub fn response_echo(data: &[u8]) -> Vec<u8> {
    let mut out = format!("{}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

pub fn response_ok() -> &'static [u8] {
    b"OK\r\n"
}

/// Format an error response.
pub fn response_error(msg: &str) -> Vec<u8> {
    format!("ERROR {msg}\r\n").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping() {
        assert_eq!(parse(b"PING"), ParseResult::Complete(Command::Ping));
        assert_eq!(parse(b"ping"), ParseResult::Complete(Command::Ping));
    }

    #[test]
    fn test_parse_ping_msg() {
        assert_eq!(
            parse(b"PING hello world"),
            ParseResult::Complete(Command::PingMsg(b"hello world".to_vec()))
        );
    }

    #[test]
    fn test_parse_quit() {
        assert_eq!(parse(b"QUIT"), ParseResult::Complete(Command::Quit));
    }

    #[test]
    fn test_parse_echo() {
        assert_eq!(
            parse(b"ECHO 100"),
            ParseResult::Complete(Command::Echo { length: 100 })
        );
        assert_eq!(parse(b"echo 0"), ParseResult::Complete(Command::Echo { length: 0 }));
    }

    #[test]
    fn test_invalid_length() {
        assert_eq!(parse(b"ECHO"), ParseResult::InvalidLength);
        assert_eq!(parse(b"ECHO "), ParseResult::InvalidLength);
        assert_eq!(parse(b"ECHO abc"), ParseResult::InvalidLength);
        assert_eq!(parse(b"ECHO -1"), ParseResult::InvalidLength);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(parse(b"HELLO"), ParseResult::Unknown);
        assert_eq!(parse(b""), ParseResult::Unknown);
        assert_eq!(parse(b"ECHOES"), ParseResult::Unknown);
        assert_eq!(parse(b"ECHO5"), ParseResult::Unknown);
    }

    #[test]
    fn test_response_echo() {
        assert_eq!(response_echo(b"hello"), b"5\r\nhello\r\n");
        assert_eq!(response_echo(b""), b"0\r\n\r\n");
    }
}
