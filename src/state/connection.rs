//! Connection handshake and message dispatch state machine.
//!
//! The machine owns the frame reader and the message decoder. The caller
//! feeds it transport bytes with [`ConnectionStateMachine::receive`] and
//! drains frames with [`ConnectionStateMachine::step`]; every decoded message
//! goes through the single dispatch point in `dispatch`.

use crate::error::{Error, ErrorFields, Result};
use crate::opts::Opts;
use crate::protocol::backend::{BackendKeyData, BackendMessage, MessageDecoder, ParameterStatus};
use crate::protocol::frame::FrameReader;
use crate::protocol::frontend::{
    md5_password, write_password, write_query, write_ssl_request, write_startup, write_terminate,
};
use crate::protocol::types::TransactionStatus;

use super::action::{Action, QueryMessage};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing started yet
    Idle,
    /// Transport dial in progress
    Connecting,
    /// SSL probe sent, waiting for the one-byte answer or the TLS handshake
    AwaitingSslAck,
    /// Startup sent, authentication and session setup in progress
    AwaitingAuth,
    /// Handshake complete
    Ready,
    /// Terminal state
    Ended,
}

/// Connection state machine.
pub struct ConnectionStateMachine {
    state: ConnectionState,
    options: Opts,
    reader: FrameReader,
    decoder: MessageDecoder,
    write_buffer: Vec<u8>,
    backend_key: Option<BackendKeyData>,
    server_params: Vec<(String, String)>,
    transaction_status: TransactionStatus,
    queryable: bool,
}

impl ConnectionStateMachine {
    /// Create a new connection state machine.
    pub fn new(options: Opts) -> Self {
        Self {
            state: ConnectionState::Idle,
            reader: FrameReader::with_max_frame_len(options.max_frame_len),
            options,
            decoder: MessageDecoder::new(),
            write_buffer: Vec::new(),
            backend_key: None,
            server_params: Vec::new(),
            transaction_status: TransactionStatus::Idle,
            queryable: false,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Options this machine was created with.
    pub fn options(&self) -> &Opts {
        &self.options
    }

    /// Get the backend key data (for cancellation).
    pub fn backend_key(&self) -> Option<&BackendKeyData> {
        self.backend_key.as_ref()
    }

    /// Get server parameters.
    pub fn server_params(&self) -> &[(String, String)] {
        &self.server_params
    }

    /// Look up one server parameter.
    pub fn server_param(&self, name: &str) -> Option<&str> {
        self.server_params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get the latest transaction status.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// True once the handshake finished and no fatal error has happened since.
    pub fn is_queryable(&self) -> bool {
        self.queryable && self.state == ConnectionState::Ready
    }

    /// Bytes to send for the last `Write`/`WriteAndReadByte` action.
    pub fn write_buffer(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Begin connecting. The caller dials the transport next.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ConnectionState::Idle {
            return Err(Error::AlreadyConnected);
        }
        tracing::debug!(host = %self.options.host, port = self.options.port, "connecting");
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// The transport is up. Sends the SSL probe or the startup message.
    pub fn transport_connected(&mut self) -> Result<Action> {
        self.expect_state(ConnectionState::Connecting, "transport connected")?;
        self.write_buffer.clear();

        if self.options.ssl.is_some() {
            write_ssl_request(&mut self.write_buffer);
            self.state = ConnectionState::AwaitingSslAck;
            tracing::debug!("sent SSL request");
            Ok(Action::WriteAndReadByte)
        } else {
            Ok(self.send_startup())
        }
    }

    /// Process SSL response byte ('S' or 'N').
    pub fn ssl_response(&mut self, response: u8) -> Result<Action> {
        self.expect_state(ConnectionState::AwaitingSslAck, "SSL response")?;
        match response {
            b'S' => {
                tracing::debug!("server accepted SSL");
                Ok(Action::TlsHandshake)
            }
            b'N' => {
                self.state = ConnectionState::Ended;
                Err(Error::SslRejected)
            }
            other => {
                self.state = ConnectionState::Ended;
                Err(Error::Protocol(format!(
                    "There was an error establishing an SSL connection: unexpected response byte {:#04x}",
                    other
                )))
            }
        }
    }

    /// Called after the TLS handshake completes.
    pub fn tls_established(&mut self) -> Result<Action> {
        self.expect_state(ConnectionState::AwaitingSslAck, "TLS established")?;
        self.write_buffer.clear();
        Ok(self.send_startup())
    }

    /// Append bytes read from the transport.
    pub fn receive(&mut self, chunk: &[u8]) {
        self.reader.add_chunk(chunk);
    }

    /// Process buffered frames until one needs the caller's attention.
    ///
    /// Returns `Action::ReadMessage` once every complete frame has been consumed.
    /// Any error moves the machine to `Ended`.
    pub fn step(&mut self) -> Result<Action> {
        let result = self.step_inner();
        if result.is_err() {
            self.state = ConnectionState::Ended;
            self.queryable = false;
        }
        result
    }

    fn step_inner(&mut self) -> Result<Action> {
        loop {
            let Some(frame) = self.reader.read()? else {
                return Ok(Action::ReadMessage);
            };
            let message = self.decoder.decode(&frame)?;
            tracing::debug!(msg = message.name(), state = ?self.state, "received");

            if let Some(action) = self.dispatch(message)? {
                return Ok(action);
            }
        }
    }

    fn dispatch(&mut self, message: BackendMessage) -> Result<Option<Action>> {
        match (self.state, message) {
            (_, BackendMessage::NoticeResponse(fields)) => {
                log_notice(&fields);
                Ok(None)
            }
            (
                ConnectionState::AwaitingAuth | ConnectionState::Ready,
                BackendMessage::ParameterStatus(param),
            ) => {
                self.set_server_param(param);
                Ok(None)
            }

            (ConnectionState::AwaitingAuth, BackendMessage::AuthenticationOk) => {
                tracing::debug!("authentication succeeded");
                Ok(None)
            }
            (ConnectionState::AwaitingAuth, BackendMessage::AuthenticationCleartextPassword) => {
                let password = self.password()?;
                self.write_buffer.clear();
                write_password(&mut self.write_buffer, &password);
                Ok(Some(Action::Write))
            }
            (ConnectionState::AwaitingAuth, BackendMessage::AuthenticationMd5Password { salt }) => {
                let password = self.password()?;
                let hashed = md5_password(&self.options.user, &password, &salt);
                self.write_buffer.clear();
                write_password(&mut self.write_buffer, &hashed);
                Ok(Some(Action::Write))
            }
            (ConnectionState::AwaitingAuth, BackendMessage::BackendKeyData(key)) => {
                if self.backend_key.is_none() {
                    self.backend_key = Some(key);
                }
                Ok(None)
            }
            (ConnectionState::AwaitingAuth, BackendMessage::ReadyForQuery(status)) => {
                self.transaction_status = status;
                self.state = ConnectionState::Ready;
                self.queryable = true;
                tracing::debug!(?status, "connection ready");
                Ok(Some(Action::Connected))
            }
            (ConnectionState::AwaitingAuth, BackendMessage::ErrorResponse(fields)) => {
                Err(Error::Server(fields))
            }

            (ConnectionState::Ready, BackendMessage::RowDescription(desc)) => {
                Ok(Some(Action::Deliver(QueryMessage::RowDescription(desc))))
            }
            (ConnectionState::Ready, BackendMessage::DataRow(row)) => {
                Ok(Some(Action::Deliver(QueryMessage::DataRow(row))))
            }
            (ConnectionState::Ready, BackendMessage::CommandComplete(complete)) => {
                Ok(Some(Action::Deliver(QueryMessage::CommandComplete(complete))))
            }
            (ConnectionState::Ready, BackendMessage::EmptyQueryResponse) => {
                Ok(Some(Action::Deliver(QueryMessage::EmptyQueryResponse)))
            }
            (ConnectionState::Ready, BackendMessage::ErrorResponse(fields)) => {
                if is_fatal(&fields) {
                    self.queryable = false;
                }
                Ok(Some(Action::Deliver(QueryMessage::ErrorResponse(fields))))
            }
            (ConnectionState::Ready, BackendMessage::ReadyForQuery(status)) => {
                self.transaction_status = status;
                Ok(Some(Action::Deliver(QueryMessage::ReadyForQuery(status))))
            }

            (state, message) => Err(Error::Protocol(format!(
                "Unexpected {} in state {:?}",
                message.name(),
                state
            ))),
        }
    }

    /// Encode a simple query into the write buffer.
    ///
    /// The caller writes the buffer next. Fails without encoding anything if
    /// the connection is not queryable or `sql` contains a NUL byte.
    pub fn write_query(&mut self, sql: &str) -> Result<()> {
        match self.state {
            ConnectionState::Ready if self.queryable => {
                reject_nul(sql, "query")?;
                self.write_buffer.clear();
                write_query(&mut self.write_buffer, sql);
                Ok(())
            }
            ConnectionState::Ready => Err(Error::NotQueryable),
            ConnectionState::Ended => Err(Error::Closed),
            _ => Err(Error::NotConnected),
        }
    }

    /// Encode a Terminate message and move to `Ended`.
    pub fn terminate(&mut self) {
        self.write_buffer.clear();
        write_terminate(&mut self.write_buffer);
        self.end();
    }

    /// Move to `Ended` without sending anything.
    pub fn end(&mut self) {
        if self.state != ConnectionState::Ended {
            tracing::debug!(state = ?self.state, "connection ended");
        }
        self.state = ConnectionState::Ended;
        self.queryable = false;
    }

    fn send_startup(&mut self) -> Action {
        write_startup(&mut self.write_buffer, &self.options.startup_params());
        self.state = ConnectionState::AwaitingAuth;
        tracing::debug!(user = %self.options.user, "sent startup message");
        Action::Write
    }

    fn password(&self) -> Result<String> {
        let password = self
            .options
            .password
            .clone()
            .ok_or_else(|| Error::Auth("Password required but not provided".into()))?;
        reject_nul(&password, "password")?;
        Ok(password)
    }

    fn set_server_param(&mut self, param: ParameterStatus) {
        tracing::debug!(name = %param.name, value = %param.value, "parameter status");
        if let Some(entry) = self.server_params.iter_mut().find(|(n, _)| *n == param.name) {
            entry.1 = param.value;
        } else {
            self.server_params.push((param.name, param.value));
        }
    }

    fn expect_state(&mut self, expected: ConnectionState, event: &str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        let err = Error::Protocol(format!("{} in state {:?}", event, self.state));
        self.state = ConnectionState::Ended;
        Err(err)
    }
}

fn is_fatal(fields: &ErrorFields) -> bool {
    matches!(fields.severity(), Some("FATAL") | Some("PANIC"))
}

/// Strings go on the wire NUL-terminated, so an interior NUL would end them early.
fn reject_nul(value: &str, what: &str) -> Result<()> {
    if memchr::memchr(0, value.as_bytes()).is_some() {
        return Err(Error::InvalidUsage(format!("{} contains a NUL byte", what)));
    }
    Ok(())
}

fn log_notice(fields: &ErrorFields) {
    tracing::info!(
        severity = fields.severity().unwrap_or("NOTICE"),
        code = fields.code().unwrap_or(""),
        "{}",
        fields.message()
    );
}
