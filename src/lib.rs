//! A small PostgreSQL client for the simple query protocol.
//!
//! # Features
//!
//! - **Sans-I/O state machines**: framing, decoding, the handshake and query
//!   correlation are plain data transformations, driven by a tokio task
//! - **Chunk-independent framing**: messages may arrive split at any byte
//! - **Cleartext and MD5 authentication**, optional TLS (feature `tls`)
//! - **Value decoding**: text values convert to [`types::Value`] by type OID
//!
//! # Example
//!
//! ```no_run
//! use pgwire_lite::{Client, Opts};
//!
//! #[tokio::main]
//! async fn main() -> pgwire_lite::Result<()> {
//!     let opts = Opts {
//!         host: "localhost".into(),
//!         user: "postgres".into(),
//!         database: Some("mydb".into()),
//!         password: Some("secret".into()),
//!         ..Default::default()
//!     };
//!
//!     let mut client = Client::new(opts);
//!     client.connect().await?;
//!
//!     let result = client.query("SELECT 1 AS num").await?;
//!     for row in result.rows() {
//!         println!("num = {:?}", row.get_by_name("num"));
//!     }
//!
//!     client.end().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod opts;
pub mod protocol;
pub mod state;
pub mod tokio;
pub mod types;

pub use error::{DecodeError, Error, ErrorFields, Result};
pub use opts::{Opts, SslOpts};
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use state::{QueryResult, Row};
pub use crate::tokio::Client;
pub use types::{Value, ValueDecoderTable};
