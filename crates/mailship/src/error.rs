//! Error types for the provider layer.

use thiserror::Error;

/// Errors that can occur while preparing or sending mail.
#[derive(Debug, Error)]
pub enum Error {
    /// SMTP transport or protocol failure.
    #[error("SMTP error: {0}")]
    Smtp(#[from] mailship_smtp::Error),

    /// The message cannot be sent as specified.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// DKIM key or configuration problem.
    #[error("DKIM error: {0}")]
    Dkim(String),
}

impl Error {
    /// Returns true when retrying the same send cannot succeed.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Smtp(err) => err.is_permanent(),
            Self::InvalidMessage(_) | Self::Dkim(_) => true,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
