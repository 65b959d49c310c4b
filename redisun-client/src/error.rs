//! # Client Errors
//!
//! Purpose: One error type for everything a submitted command can fail with.
//!
//! `ClientError` is `Clone` because a single transport or protocol failure is
//! delivered to every request still queued on the failed connection.

use std::sync::Arc;

use redisun_common::ProtocolError;
use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Network failure while connecting, reading, or writing.
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
    /// Malformed bytes from the server; the connection was discarded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Server answered with a simple error reply.
    #[error("server error: {0}")]
    Server(String),
    /// Reply variant does not match what the caller asked for.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },
    /// The connection went away before the reply arrived.
    #[error("connection closed")]
    ConnectionClosed,
    /// TCP connect did not finish within the configured timeout.
    #[error("connect timed out")]
    ConnectTimeout,
    /// Reply did not arrive within the configured command timeout.
    #[error("command timed out")]
    Timeout,
    /// HELLO or SELECT failed on a new connection.
    #[error("handshake failed: {0}")]
    Handshake(Box<ClientError>),
    /// Address or URL could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Configuration is inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    /// A command needs at least one token.
    #[error("empty command")]
    EmptyCommand,
    /// Requested feature is not available in this client.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    /// The pool was shut down.
    #[error("pool closed")]
    PoolClosed,
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(Arc::new(err))
    }
}

impl ClientError {
    /// True when the error means the connection itself is unusable.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Protocol(_)
                | ClientError::ConnectionClosed
                | ClientError::Handshake(_)
        )
    }
}
