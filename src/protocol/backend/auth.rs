//! Startup-phase backend messages: authentication requests, key data,
//! parameter status and readiness.

use zerocopy::byteorder::big_endian::U32 as U32BE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::DecodeError;
use crate::protocol::codec::{read_bytes, read_cstr, read_i32, read_u8};
use crate::protocol::types::TransactionStatus;

use super::BackendMessage;

/// Authentication method constants.
pub mod auth_type {
    pub const OK: i32 = 0;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const SASL: i32 = 10;
}

/// Declared length of an AuthenticationCleartextPassword frame.
const CLEARTEXT_PASSWORD_LEN: u32 = 8;

/// Declared length of an AuthenticationMD5Password frame (code + 4-byte salt).
const MD5_PASSWORD_LEN: u32 = 12;

/// Parse an Authentication (`R`) message.
///
/// `length` is the declared frame length; the password requests have a fixed
/// shape and anything else is rejected rather than guessed at.
pub(super) fn parse_authentication(
    length: u32,
    payload: &[u8],
) -> Result<BackendMessage, DecodeError> {
    let (code, rest) = read_i32(payload, "authentication code")?;

    match code {
        auth_type::OK => Ok(BackendMessage::AuthenticationOk),
        auth_type::CLEARTEXT_PASSWORD => {
            if length != CLEARTEXT_PASSWORD_LEN {
                return Err(DecodeError::UnexpectedAuthLength {
                    method: "CleartextPassword",
                    expected: CLEARTEXT_PASSWORD_LEN,
                    actual: length,
                });
            }
            Ok(BackendMessage::AuthenticationCleartextPassword)
        }
        auth_type::MD5_PASSWORD => {
            if length != MD5_PASSWORD_LEN {
                return Err(DecodeError::UnexpectedAuthLength {
                    method: "MD5Password",
                    expected: MD5_PASSWORD_LEN,
                    actual: length,
                });
            }
            let (salt, _) = read_bytes(rest, 4, "MD5 salt")?;
            let mut buf = [0u8; 4];
            buf.copy_from_slice(salt);
            Ok(BackendMessage::AuthenticationMd5Password { salt: buf })
        }
        other => Err(DecodeError::UnsupportedAuth(other)),
    }
}

/// BackendKeyData message - contains process ID and secret key for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct BackendKeyData {
    pid: U32BE,
    secret_key: U32BE,
}

impl BackendKeyData {
    /// Build key data from its two components.
    pub fn new(process_id: u32, secret_key: u32) -> Self {
        Self {
            pid: U32BE::new(process_id),
            secret_key: U32BE::new(secret_key),
        }
    }

    /// Parse a BackendKeyData message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let (key, _) =
            Self::read_from_prefix(payload).map_err(|_| DecodeError::Truncated("BackendKeyData"))?;
        Ok(key)
    }

    /// Get the process ID.
    pub fn process_id(&self) -> u32 {
        self.pid.get()
    }

    /// Get the secret key.
    pub fn secret_key(&self) -> u32 {
        self.secret_key.get()
    }
}

/// ParameterStatus message - server parameter name and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterStatus {
    /// Parameter name
    pub name: String,
    /// Parameter value
    pub value: String,
}

impl ParameterStatus {
    /// Parse a ParameterStatus message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let (name, rest) = read_cstr(payload, "parameter name")?;
        let (value, _) = read_cstr(rest, "parameter value")?;
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

/// Parse a ReadyForQuery message into its transaction status.
pub fn parse_ready_for_query(payload: &[u8]) -> Result<TransactionStatus, DecodeError> {
    let (status, _) = read_u8(payload, "transaction status")?;
    TransactionStatus::from_byte(status)
}
