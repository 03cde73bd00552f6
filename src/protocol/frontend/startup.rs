//! Startup, SSL negotiation, cancellation and termination messages.
//!
//! None of the pre-startup messages carry a tag byte: they begin directly
//! with the 4-byte length.

use crate::error::DecodeError;
use crate::protocol::codec::{MessageBuilder, read_cstr, read_i16, read_i32};

/// Protocol major version.
pub const PROTOCOL_MAJOR: i16 = 3;

/// Protocol minor version.
pub const PROTOCOL_MINOR: i16 = 0;

/// Magic values sent in place of the version in an SSLRequest.
pub const SSL_REQUEST_CODE: (i16, i16) = (1234, 5679);

/// Magic values sent in place of the version in a CancelRequest.
pub const CANCEL_REQUEST_CODE: (i16, i16) = (1234, 5678);

/// Write an SSLRequest message.
///
/// This is sent before StartupMessage to request TLS encryption.
/// Server responds with single byte: 'S' (accepted) or 'N' (rejected).
pub fn write_ssl_request(buf: &mut Vec<u8>) {
    let mut msg = MessageBuilder::new_untagged(buf);
    msg.write_i16(SSL_REQUEST_CODE.0);
    msg.write_i16(SSL_REQUEST_CODE.1);
    msg.finish();
}

/// Write a StartupMessage.
///
/// Parameters is a list of (name, value) pairs, e.g. `user`, `database`,
/// `client_encoding`.
pub fn write_startup(buf: &mut Vec<u8>, params: &[(&str, &str)]) {
    let mut msg = MessageBuilder::new_untagged(buf);
    msg.write_i16(PROTOCOL_MAJOR);
    msg.write_i16(PROTOCOL_MINOR);

    for (name, value) in params {
        msg.write_cstr(name);
        msg.write_cstr(value);
    }

    // Terminator
    msg.write_u8(0);
    msg.finish();
}

/// Write a CancelRequest message.
///
/// This is sent on a NEW connection to cancel a query running on another connection.
/// The server closes the connection immediately with no response.
pub fn write_cancel_request(buf: &mut Vec<u8>, pid: u32, secret_key: u32) {
    let mut msg = MessageBuilder::new_untagged(buf);
    msg.write_i16(CANCEL_REQUEST_CODE.0);
    msg.write_i16(CANCEL_REQUEST_CODE.1);
    msg.write_u32(pid);
    msg.write_u32(secret_key);
    msg.finish();
}

/// Write a Terminate message.
///
/// Sent to cleanly close the connection.
pub fn write_terminate(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::TERMINATE);
    msg.finish();
}

/// A StartupMessage as the server sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupMessage {
    /// Protocol (major, minor) version
    pub version: (i16, i16),
    /// Startup parameters in the order they were sent
    pub params: Vec<(String, String)>,
}

impl StartupMessage {
    /// Parse a complete StartupMessage, length prefix included.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let (length, rest) = read_i32(data, "startup length")?;
        if length < 8 || length as usize != data.len() {
            return Err(DecodeError::InvalidFrameLength(length));
        }
        let (major, rest) = read_i16(rest, "protocol major version")?;
        let (minor, mut rest) = read_i16(rest, "protocol minor version")?;

        let mut params = Vec::new();
        while rest.first().is_some_and(|&b| b != 0) {
            let (name, tail) = read_cstr(rest, "startup parameter name")?;
            let (value, tail) = read_cstr(tail, "startup parameter value")?;
            params.push((name.to_string(), value.to_string()));
            rest = tail;
        }
        if rest != [0] {
            return Err(DecodeError::MissingNullTerminator("startup parameters"));
        }

        Ok(Self {
            version: (major, minor),
            params,
        })
    }

    /// Value of a startup parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_request() {
        let mut buf = Vec::new();
        write_ssl_request(&mut buf);

        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[0..4], &8_i32.to_be_bytes());
        assert_eq!(&buf[4..6], &1234_i16.to_be_bytes());
        assert_eq!(&buf[6..8], &5679_i16.to_be_bytes());
        // Same magic as the 32-bit code 80877103 in the protocol docs.
        assert_eq!(i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]), 80877103);
    }

    #[test]
    fn test_startup_round_trip() {
        let mut buf = Vec::new();
        write_startup(
            &mut buf,
            &[("user", "alice"), ("database", "inventory"), ("client_encoding", "UTF8")],
        );

        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(len as usize, buf.len());

        let startup = StartupMessage::parse(&buf).unwrap();
        assert_eq!(startup.version, (3, 0));
        assert_eq!(startup.param("user"), Some("alice"));
        assert_eq!(startup.param("database"), Some("inventory"));
        assert_eq!(startup.param("client_encoding"), Some("UTF8"));
        assert_eq!(startup.params.len(), 3);
    }

    #[test]
    fn test_startup_without_terminator() {
        let mut buf = Vec::new();
        write_startup(&mut buf, &[("user", "alice")]);
        buf.pop();
        let len = buf.len() as i32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());
        assert!(StartupMessage::parse(&buf).is_err());
    }

    #[test]
    fn test_cancel_request() {
        let mut buf = Vec::new();
        write_cancel_request(&mut buf, 123, 456);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[0..4], &16_i32.to_be_bytes());
        assert_eq!(i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]), 80877102);
        assert_eq!(&buf[8..12], &123_u32.to_be_bytes());
        assert_eq!(&buf[12..16], &456_u32.to_be_bytes());
    }

    #[test]
    fn test_terminate() {
        let mut buf = Vec::new();
        write_terminate(&mut buf);

        assert_eq!(buf.len(), 5);
        assert_eq!(buf[0], b'X');
        assert_eq!(&buf[1..5], &4_i32.to_be_bytes());
    }
}
