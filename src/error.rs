//! Error types for pgwire-lite.

use thiserror::Error;

/// Result type for pgwire-lite operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Diagnostic fields carried by ErrorResponse and NoticeResponse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Position in internal query
    pub internal_position: Option<u32>,
    /// Failed internal command text
    pub internal_query: Option<String>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file name
    pub file: Option<String>,
    /// Source line number
    pub line: Option<u32>,
    /// Source routine name
    pub routine: Option<String>,
}

impl ErrorFields {
    /// Primary human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    /// SQLSTATE code, if the server sent one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Severity, preferring the non-localized form.
    pub fn severity(&self) -> Option<&str> {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Malformed or unsupported frame content.
///
/// Every decode error is fatal to the connection it occurred on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Message tag outside the set this client understands
    #[error("unprocessed message type '{0}'")]
    UnknownMessage(char),

    /// Fixed-shape authentication request with the wrong declared length
    #[error("{method} authentication request with length {actual}, expected {expected}")]
    UnexpectedAuthLength {
        method: &'static str,
        expected: u32,
        actual: u32,
    },

    /// Authentication method this client cannot perform
    #[error("unsupported authentication method: {0}")]
    UnsupportedAuth(i32),

    /// Declared frame length smaller than the length field itself
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i32),

    /// Declared frame length above the configured buffering limit
    #[error("frame length {length} exceeds limit {limit}")]
    FrameTooLarge { length: usize, limit: usize },

    /// Payload ended before a field could be read
    #[error("message truncated while reading {0}")]
    Truncated(&'static str),

    /// String field without a null terminator
    #[error("missing null terminator in {0}")]
    MissingNullTerminator(&'static str),

    /// Text that is not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// ReadyForQuery status byte outside I/T/E
    #[error("unknown transaction status '{0}'")]
    UnknownTransactionStatus(char),

    /// Column format code other than text or binary
    #[error("unknown format code: {0}")]
    UnknownFormatCode(u16),
}

/// Error type for pgwire-lite.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response
    #[error("PostgreSQL error: {0}")]
    Server(ErrorFields),

    /// Malformed or unsupported message from the server
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Message not valid for the current connection state
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication could not proceed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// TLS error
    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Server answered the SSL probe with 'N'
    #[error("Server does not support SSL connections")]
    SslRejected,

    /// Connection establishment did not finish in time
    #[error("timeout expired")]
    Timeout,

    /// Transport closed after a local end request
    #[error("Connection terminated")]
    Terminated,

    /// Transport closed without a local end request
    #[error("Connection terminated unexpectedly")]
    TerminatedUnexpectedly,

    /// `connect` called more than once
    #[error("Client has already been connected. You cannot reuse a client.")]
    AlreadyConnected,

    /// Operation needs a connected client
    #[error("Client is not connected")]
    NotConnected,

    /// Connection hit an error and no longer accepts queries
    #[error("Client has encountered a connection error and is not queryable")]
    NotQueryable,

    /// Client was ended
    #[error("Client was closed and is not queryable")]
    Closed,

    /// A query is already in flight on this connection
    #[error("Client is busy with another query")]
    Busy,

    /// Invalid usage (bad options, misuse of the API)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Text value could not be converted by the value decoder table
    #[error("Value decode error: {0}")]
    Value(String),
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::Decode(_)
            | Error::Protocol(_)
            | Error::Timeout
            | Error::Terminated
            | Error::TerminatedUnexpectedly
            | Error::SslRejected => true,
            #[cfg(feature = "tls")]
            Error::Tls(_) => true,
            Error::Server(fields) => {
                // FATAL and PANIC errors indicate connection is broken
                matches!(fields.severity(), Some("FATAL") | Some("PANIC"))
            }
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code(),
            _ => None,
        }
    }

    /// Get the server diagnostic fields if this is a server error.
    pub fn server_fields(&self) -> Option<&ErrorFields> {
        match self {
            Error::Server(fields) => Some(fields),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_server_error() {
        let fields = ErrorFields {
            severity: Some("ERROR".into()),
            code: Some("42601".into()),
            message: Some("syntax error".into()),
            hint: Some("check the query".into()),
            ..Default::default()
        };
        let err = Error::Server(fields);
        assert_eq!(
            err.to_string(),
            "PostgreSQL error: ERROR: syntax error (SQLSTATE 42601)\nHINT: check the query"
        );
        assert_eq!(err.sqlstate(), Some("42601"));
        assert!(!err.is_connection_broken());
    }

    #[test]
    fn test_fatal_breaks_connection() {
        let err = Error::Server(ErrorFields {
            severity: Some("FATAL".into()),
            ..Default::default()
        });
        assert!(err.is_connection_broken());
        assert!(Error::Decode(DecodeError::UnknownMessage('x')).is_connection_broken());
        assert!(!Error::Busy.is_connection_broken());
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::UnexpectedAuthLength {
            method: "MD5Password",
            expected: 12,
            actual: 10,
        };
        assert_eq!(
            err.to_string(),
            "MD5Password authentication request with length 10, expected 12"
        );
        assert_eq!(
            DecodeError::UnknownMessage('x').to_string(),
            "unprocessed message type 'x'"
        );
    }
}
