//! Asynchronous PostgreSQL client using Tokio.

mod client;
mod conn;
mod stream;

pub use client::Client;
