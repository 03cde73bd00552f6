//! PostgreSQL backend (server → client) messages.
//!
//! [`MessageDecoder`] turns one [`Frame`] into one [`BackendMessage`]. It is
//! stateless across messages except for the column decode mode, which the
//! last field of each RowDescription sets for the DataRows that follow.

pub mod auth;
pub mod error;
pub mod query;

pub use auth::{BackendKeyData, ParameterStatus};
pub use query::{CommandComplete, DataRow, FieldDescription, RawValue, RowDescription, rows_affected};

use crate::error::{DecodeError, ErrorFields};
use crate::protocol::frame::Frame;
use crate::protocol::types::{FormatCode, TransactionStatus};

/// Backend message type bytes.
pub mod msg_type {
    /// Authentication message
    pub const AUTHENTICATION: u8 = b'R';
    /// BackendKeyData
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// ParameterStatus
    pub const PARAMETER_STATUS: u8 = b'S';
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// DataRow
    pub const DATA_ROW: u8 = b'D';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
}

/// A decoded backend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// Authentication successful
    AuthenticationOk,
    /// Cleartext password required
    AuthenticationCleartextPassword,
    /// MD5 password required (with 4-byte salt)
    AuthenticationMd5Password { salt: [u8; 4] },
    /// Process ID and secret key for cancellation
    BackendKeyData(BackendKeyData),
    /// Server parameter name and value
    ParameterStatus(ParameterStatus),
    /// Server is ready for the next query
    ReadyForQuery(TransactionStatus),
    /// Result column metadata
    RowDescription(RowDescription),
    /// One result row
    DataRow(DataRow),
    /// Statement finished, with its command tag
    CommandComplete(CommandComplete),
    /// Query string was empty
    EmptyQueryResponse,
    /// Server-reported error
    ErrorResponse(ErrorFields),
    /// Server-reported notice or warning
    NoticeResponse(ErrorFields),
}

impl BackendMessage {
    /// Message name as used in protocol documentation, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BackendMessage::AuthenticationOk => "AuthenticationOk",
            BackendMessage::AuthenticationCleartextPassword => "AuthenticationCleartextPassword",
            BackendMessage::AuthenticationMd5Password { .. } => "AuthenticationMD5Password",
            BackendMessage::BackendKeyData(_) => "BackendKeyData",
            BackendMessage::ParameterStatus(_) => "ParameterStatus",
            BackendMessage::ReadyForQuery(_) => "ReadyForQuery",
            BackendMessage::RowDescription(_) => "RowDescription",
            BackendMessage::DataRow(_) => "DataRow",
            BackendMessage::CommandComplete(_) => "CommandComplete",
            BackendMessage::EmptyQueryResponse => "EmptyQueryResponse",
            BackendMessage::ErrorResponse(_) => "ErrorResponse",
            BackendMessage::NoticeResponse(_) => "NoticeResponse",
        }
    }
}

/// Decodes frames into typed messages.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    format: FormatCode,
}

impl MessageDecoder {
    /// Create a decoder in text mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode mode that will be applied to the next DataRow.
    pub fn format(&self) -> FormatCode {
        self.format
    }

    /// Decode one frame.
    pub fn decode(&mut self, frame: &Frame) -> Result<BackendMessage, DecodeError> {
        let payload = &frame.payload;

        let message = match frame.tag {
            msg_type::AUTHENTICATION => auth::parse_authentication(frame.length, payload)?,
            msg_type::BACKEND_KEY_DATA => {
                BackendMessage::BackendKeyData(BackendKeyData::parse(payload)?)
            }
            msg_type::PARAMETER_STATUS => {
                BackendMessage::ParameterStatus(ParameterStatus::parse(payload)?)
            }
            msg_type::READY_FOR_QUERY => {
                BackendMessage::ReadyForQuery(auth::parse_ready_for_query(payload)?)
            }
            msg_type::ROW_DESCRIPTION => {
                let desc = RowDescription::parse(payload)?;
                if let Some(last) = desc.fields.last() {
                    self.format = last.format;
                }
                BackendMessage::RowDescription(desc)
            }
            msg_type::DATA_ROW => BackendMessage::DataRow(DataRow::parse(payload, self.format)?),
            msg_type::COMMAND_COMPLETE => {
                BackendMessage::CommandComplete(CommandComplete::parse(payload)?)
            }
            msg_type::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
            msg_type::ERROR_RESPONSE => BackendMessage::ErrorResponse(error::parse_fields(payload)?),
            msg_type::NOTICE_RESPONSE => {
                BackendMessage::NoticeResponse(error::parse_fields(payload)?)
            }
            other => return Err(DecodeError::UnknownMessage(char::from(other))),
        };

        Ok(message)
    }
}
