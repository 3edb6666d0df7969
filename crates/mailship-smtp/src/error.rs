//! Error types for SMTP operations.

use crate::types::Reply;
use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Connection failed (socket error or non-220 greeting).
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Connect-and-greet sequence exceeded its deadline.
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A command did not receive its reply within the deadline.
    #[error("{command} timed out after {duration:?}")]
    CommandTimeout {
        /// Command that was awaiting a reply.
        command: String,
        /// Deadline that elapsed.
        duration: Duration,
    },

    /// Server replied with a code outside the expected set.
    #[error("Unexpected reply: expected {expected:?}, got {} {}", reply.code, reply.message_text())]
    UnexpectedReply {
        /// Codes the caller would have accepted.
        expected: Vec<u16>,
        /// The reply as received, raw text preserved.
        reply: Reply,
    },

    /// Authentication rejected by the server.
    #[error("Authentication failed ({code}): {message}")]
    Authentication {
        /// Reply code, typically 535.
        code: u16,
        /// Server diagnostic text.
        message: String,
    },

    /// Pool exhausted and no connection was released within the wait budget.
    #[error("Timed out waiting for a pooled connection after {0:?}")]
    QueueTimeout(Duration),

    /// Pool was shut down while the operation was pending.
    #[error("Provider is shut down")]
    Shutdown,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Protocol error (malformed reply, invalid hostname, bad state).
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Creates an `UnexpectedReply` error from the expected set and the reply.
    #[must_use]
    pub fn unexpected_reply(expected: &[u16], reply: Reply) -> Self {
        Self::UnexpectedReply {
            expected: expected.to_vec(),
            reply,
        }
    }

    /// Returns true if this is a permanent failure (5xx class).
    ///
    /// Permanent failures will not succeed on retry with the same input.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::UnexpectedReply { reply, .. } => reply.is_permanent_error(),
            Self::Authentication { .. } | Self::Config(_) | Self::InvalidAddress(_) => true,
            _ => false,
        }
    }

    /// Returns true if this is a transient failure (4xx class or timeout).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::UnexpectedReply { reply, .. } => reply.is_transient_error(),
            Self::ConnectTimeout(_) | Self::CommandTimeout { .. } | Self::QueueTimeout(_) => true,
            _ => false,
        }
    }
}
