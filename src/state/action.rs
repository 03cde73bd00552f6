//! Action types for state machine I/O requests.

use crate::error::ErrorFields;
use crate::protocol::backend::{CommandComplete, DataRow, RowDescription};
use crate::protocol::types::TransactionStatus;

/// Action requested by the connection state machine.
///
/// The caller should perform the requested I/O and then call the
/// appropriate method to continue the state machine.
#[derive(Debug)]
pub enum Action {
    /// Write the state machine's write buffer to the server.
    ///
    /// The caller should write all bytes to the socket and flush,
    /// then call `step()` again.
    Write,

    /// Write the write buffer to the server, then read a single byte.
    ///
    /// Used for SSL negotiation: write SSL request, then read response ('S' or 'N').
    /// Pass the byte to `ssl_response()`.
    WriteAndReadByte,

    /// Perform TLS handshake on the same transport.
    ///
    /// After successful handshake, call `tls_established()`.
    TlsHandshake,

    /// No complete frame is buffered.
    ///
    /// The caller should read more bytes from the transport, pass them to
    /// `receive()`, then call `step()` again.
    ReadMessage,

    /// The first ReadyForQuery arrived; the handshake is complete.
    Connected,

    /// A query-phase message for the query correlation layer.
    Deliver(QueryMessage),
}

/// Backend messages that belong to a query cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryMessage {
    /// Result column metadata
    RowDescription(RowDescription),
    /// One result row
    DataRow(DataRow),
    /// Statement finished
    CommandComplete(CommandComplete),
    /// Query string was empty
    EmptyQueryResponse,
    /// Server-reported error for the current statement
    ErrorResponse(ErrorFields),
    /// Query cycle finished; the server accepts the next query
    ReadyForQuery(TransactionStatus),
}
