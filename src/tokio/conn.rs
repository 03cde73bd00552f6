//! Connection driver task.
//!
//! [`handshake`] runs the startup sequence in the caller's future. The
//! resulting [`Conn`] is then moved into a spawned task that owns the
//! transport and sequences every frame and client command for it.

use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::write_cancel_request;
use crate::protocol::types::TransactionStatus;
use crate::state::{
    Action, ConnectionStateMachine, QueryAction, QueryCorrelator, QueryMessage, QueryResult,
    Submit,
};

use super::stream::Stream;

const READ_BUFFER_SIZE: usize = 8192;

pub(crate) type QueryReply = oneshot::Sender<Result<QueryResult>>;

/// Requests from the client handle to the driver.
pub(crate) enum Command {
    Query { sql: String, reply: QueryReply },
    End { reply: oneshot::Sender<Result<()>> },
}

/// Session state published by the driver after every batch of frames.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub queryable: bool,
    pub transaction_status: TransactionStatus,
    pub server_params: Vec<(String, String)>,
}

impl Session {
    fn from_state(state: &ConnectionStateMachine) -> Self {
        Self {
            queryable: state.is_queryable(),
            transaction_status: state.transaction_status(),
            server_params: state.server_params().to_vec(),
        }
    }
}

/// Run the startup sequence up to the first ReadyForQuery.
async fn handshake(opts: Opts) -> Result<(Stream, ConnectionStateMachine)> {
    let mut state = ConnectionStateMachine::new(opts);
    state.start()?;
    let mut stream = Stream::connect(state.options()).await?;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let mut action = state.transport_connected()?;
    loop {
        action = match action {
            Action::Write => {
                stream.send(state.write_buffer()).await?;
                state.step()?
            }
            Action::WriteAndReadByte => {
                stream.send(state.write_buffer()).await?;
                let byte = stream.read_u8().await?;
                state.ssl_response(byte)?
            }
            Action::TlsHandshake => {
                #[cfg(feature = "tls")]
                {
                    let host = state.options().host.clone();
                    let ssl = state.options().ssl.clone().unwrap_or_default();
                    stream = stream.upgrade_to_tls(&host, &ssl).await?;
                    state.tls_established()?
                }
                #[cfg(not(feature = "tls"))]
                {
                    return Err(Error::InvalidUsage(
                        "TLS requested but the tls feature is not enabled".into(),
                    ));
                }
            }
            Action::ReadMessage => {
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    state.end();
                    return Err(Error::TerminatedUnexpectedly);
                }
                state.receive(&buf[..n]);
                state.step()?
            }
            Action::Connected => break,
            Action::Deliver(message) => {
                return Err(Error::Protocol(format!(
                    "Unexpected {:?} during startup",
                    message
                )));
            }
        };
    }

    Ok((stream, state))
}

/// Send a CancelRequest on a new, short-lived transport. No reply is expected.
pub(crate) async fn cancel_request(opts: &Opts, key: BackendKeyData) -> Result<()> {
    let mut stream = Stream::connect(opts).await?;
    let mut buf = Vec::new();
    write_cancel_request(&mut buf, key.process_id(), key.secret_key());
    stream.send(&buf).await?;
    stream.shutdown().await?;
    tracing::debug!(process_id = key.process_id(), "sent cancel request");
    Ok(())
}

/// A connected session, owned by its driver task.
pub(crate) struct Conn {
    stream: Stream,
    state: ConnectionStateMachine,
    queries: QueryCorrelator<QueryReply>,
    session: watch::Sender<Session>,
    ending: bool,
}

impl Conn {
    /// Open the transport and complete the handshake.
    pub(crate) async fn connect(opts: Opts) -> Result<Self> {
        let (stream, state) = handshake(opts).await?;
        let (session, _) = watch::channel(Session::from_state(&state));
        Ok(Self {
            stream,
            state,
            queries: QueryCorrelator::new(),
            session,
            ending: false,
        })
    }

    pub(crate) fn backend_key(&self) -> Option<BackendKeyData> {
        self.state.backend_key().copied()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Driver loop. Returns when the session ends.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        // Frames that arrived in the same read as the handshake's ReadyForQuery.
        if let Err(e) = self.process_frames().await {
            self.fail(e);
            return;
        }

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Query { sql, reply }) => {
                        if let Err(e) = self.submit(sql, reply).await {
                            self.fail(e);
                            return;
                        }
                    }
                    Some(Command::End { reply }) => {
                        let _ = reply.send(self.end().await);
                        return;
                    }
                    None => {
                        tracing::debug!("client dropped, closing connection");
                        let _ = self.end().await;
                        return;
                    }
                },
                read = self.stream.read(&mut buf) => match read {
                    Ok(0) => {
                        self.closed();
                        return;
                    }
                    Ok(n) => {
                        self.state.receive(&buf[..n]);
                        if let Err(e) = self.process_frames().await {
                            self.fail(e);
                            return;
                        }
                    }
                    Err(e) => {
                        self.fail(e.into());
                        return;
                    }
                },
            }
        }
    }

    async fn submit(&mut self, sql: String, reply: QueryReply) -> Result<()> {
        if !self.state.is_queryable() {
            let _ = reply.send(Err(Error::NotQueryable));
            return Ok(());
        }
        match self.queries.submit(sql, reply) {
            Submit::Send(sql) => self.send_query(&sql).await,
            Submit::Held => {
                tracing::debug!("query held until ReadyForQuery");
                Ok(())
            }
            Submit::Rejected(reply, err) => {
                let _ = reply.send(Err(err));
                Ok(())
            }
        }
    }

    async fn send_query(&mut self, sql: &str) -> Result<()> {
        if let Err(e) = self.state.write_query(sql) {
            // The correlator already holds this query as in flight.
            if let Some(reply) = self.queries.drain().into_iter().next() {
                let _ = reply.send(Err(e));
            }
            return Ok(());
        }
        tracing::debug!(sql, "sending query");
        self.stream.send(self.state.write_buffer()).await?;
        Ok(())
    }

    /// Dispatch every buffered frame, then publish the session state.
    async fn process_frames(&mut self) -> Result<()> {
        loop {
            match self.state.step()? {
                Action::ReadMessage => break,
                Action::Deliver(message) => self.deliver(message).await?,
                other => {
                    return Err(Error::Protocol(format!(
                        "Unexpected action {:?} after startup",
                        other
                    )));
                }
            }
        }
        self.publish();
        Ok(())
    }

    async fn deliver(&mut self, message: QueryMessage) -> Result<()> {
        match self.queries.handle(message) {
            Ok(None) => Ok(()),
            Ok(Some(QueryAction::Resolve(reply, result))) => {
                self.publish();
                // The caller may have stopped waiting.
                let _ = reply.send(result);
                Ok(())
            }
            Ok(Some(QueryAction::Send(sql))) => self.send_query(&sql).await,
            Err(Error::Server(fields)) => {
                tracing::error!(
                    code = fields.code().unwrap_or(""),
                    "server error outside a pending query: {}",
                    fields
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn publish(&self) {
        self.session.send_replace(Session::from_state(&self.state));
    }

    /// Close the session on request.
    ///
    /// With a query unresolved the transport is dropped without Terminate,
    /// since the server may be mid-response.
    async fn end(&mut self) -> Result<()> {
        self.ending = true;
        if self.queries.has_unresolved() {
            tracing::debug!("ending with a query in flight, dropping transport");
            self.state.end();
        } else {
            self.state.terminate();
            let sent = match self.stream.send(self.state.write_buffer()).await {
                Ok(()) => self.stream.shutdown().await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                tracing::warn!(error = %e, "transport error while ending");
            }
        }
        self.publish();
        err_all(self.queries.drain(), || Error::Terminated);
        Ok(())
    }

    /// The server closed the transport.
    fn closed(&mut self) {
        if !self.ending {
            tracing::warn!("connection terminated unexpectedly");
        }
        self.state.end();
        self.publish();
        let ending = self.ending;
        err_all(self.queries.drain(), || {
            if ending {
                Error::Terminated
            } else {
                Error::TerminatedUnexpectedly
            }
        });
    }

    /// Fail the session with `err`. The in-flight query receives the error itself.
    fn fail(&mut self, err: Error) {
        self.state.end();
        self.publish();
        if self.ending && matches!(err, Error::Io(_)) {
            tracing::warn!(error = %err, "suppressed transport error while ending");
            err_all(self.queries.drain(), || Error::Terminated);
            return;
        }

        let mut replies = self.queries.drain().into_iter();
        match replies.next() {
            Some(reply) => {
                let _ = reply.send(Err(err));
            }
            None => tracing::error!(error = %err, "connection error"),
        }
        err_all(replies, || Error::NotQueryable);
    }
}

fn err_all(replies: impl IntoIterator<Item = QueryReply>, err: impl Fn() -> Error) {
    for reply in replies {
        let _ = reply.send(Err(err()));
    }
}
