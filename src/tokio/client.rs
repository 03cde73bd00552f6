//! Public asynchronous client.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::backend::BackendKeyData;
use crate::protocol::types::TransactionStatus;
use crate::state::QueryResult;

use super::conn::{Command, Conn, Session, cancel_request};

const COMMAND_CHANNEL_SIZE: usize = 16;

struct Handle {
    commands: mpsc::Sender<Command>,
    session: watch::Receiver<Session>,
    backend_key: Option<BackendKeyData>,
}

/// A PostgreSQL client speaking the simple query protocol.
///
/// One client owns one connection and runs at most one query at a time.
///
/// ```no_run
/// use pgwire_lite::{Client, Opts};
///
/// # async fn run() -> pgwire_lite::Result<()> {
/// let mut client = Client::new(Opts::try_from("postgres://postgres@localhost/postgres")?);
/// client.connect().await?;
///
/// let result = client.query("SELECT 1").await?;
/// assert_eq!(result.rows()[0].get(0), Some("1"));
///
/// client.end().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    opts: Opts,
    handle: Option<Handle>,
    connect_attempted: bool,
    ended: AtomicBool,
}

impl Client {
    /// Create an unconnected client.
    pub fn new(opts: Opts) -> Self {
        Self {
            opts,
            handle: None,
            connect_attempted: false,
            ended: AtomicBool::new(false),
        }
    }

    /// Connection options.
    pub fn options(&self) -> &Opts {
        &self.opts
    }

    /// Open the connection and complete the handshake.
    ///
    /// A client connects at most once. If a connect timeout is configured and
    /// expires, the transport is dropped and the client is closed.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connect_attempted {
            return Err(Error::AlreadyConnected);
        }
        if self.ended.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.connect_attempted = true;

        let opts = self.opts.clone();
        let conn = match self.opts.effective_connect_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, Conn::connect(opts)).await {
                Ok(conn) => conn?,
                Err(_elapsed) => {
                    self.ended.store(true, Ordering::Release);
                    tracing::debug!(?timeout, "connect timed out");
                    return Err(Error::Timeout);
                }
            },
            None => Conn::connect(opts).await?,
        };

        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        self.handle = Some(Handle {
            commands,
            session: conn.subscribe(),
            backend_key: conn.backend_key(),
        });
        tokio::spawn(conn.run(receiver));
        Ok(())
    }

    /// Run a simple query and collect its result.
    ///
    /// Fails without touching the transport if the client is not connected,
    /// not queryable, or closed. Fails with [`Error::Busy`] while another
    /// query on this client is unresolved.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        if self.ended.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let handle = self.handle.as_ref().ok_or(Error::NotConnected)?;
        if !handle.session.borrow().queryable {
            return Err(Error::NotQueryable);
        }

        let (reply, response) = oneshot::channel();
        handle
            .commands
            .send(Command::Query {
                sql: sql.to_string(),
                reply,
            })
            .await
            .map_err(|_closed| Error::NotQueryable)?;
        response
            .await
            .map_err(|_dropped| Error::TerminatedUnexpectedly)?
    }

    /// Close the connection. Calls after the first return `Ok(())`.
    pub async fn end(&self) -> Result<()> {
        if self.ended.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(handle) = &self.handle else {
            return Ok(());
        };

        let (reply, response) = oneshot::channel();
        if handle.commands.send(Command::End { reply }).await.is_err() {
            // Driver already gone.
            return Ok(());
        }
        response.await.unwrap_or(Ok(()))
    }

    /// Ask the server to cancel the running query.
    ///
    /// Opens a separate connection and sends a CancelRequest. The server
    /// sends no acknowledgement; the query, if cancelled, fails on its own.
    pub async fn cancel(&self) -> Result<()> {
        let key = self.backend_key().ok_or(Error::NotConnected)?;
        cancel_request(&self.opts, key).await
    }

    /// Backend key data received during startup.
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.handle.as_ref().and_then(|h| h.backend_key)
    }

    /// Backend process ID.
    pub fn process_id(&self) -> Option<u32> {
        self.backend_key().map(|k| k.process_id())
    }

    /// Secret key for cancel requests.
    pub fn secret_key(&self) -> Option<u32> {
        self.backend_key().map(|k| k.secret_key())
    }

    /// Latest value of a server parameter such as `server_version`.
    pub fn server_param(&self, name: &str) -> Option<String> {
        let handle = self.handle.as_ref()?;
        let session = handle.session.borrow();
        session
            .server_params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Transaction status from the latest ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.handle
            .as_ref()
            .map_or(TransactionStatus::Idle, |h| h.session.borrow().transaction_status)
    }

    /// True if the connection is up and accepting queries.
    pub fn is_queryable(&self) -> bool {
        !self.ended.load(Ordering::Acquire)
            && self
                .handle
                .as_ref()
                .is_some_and(|h| h.session.borrow().queryable)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.opts.host)
            .field("port", &self.opts.port)
            .field("process_id", &self.process_id())
            .field("queryable", &self.is_queryable())
            .finish()
    }
}
