//! Outbound transmission error types.

use thiserror::Error;

/// Errors from sending one message to one recipient.
///
/// The `Display` text is stored verbatim as the server response of a
/// failed attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailerError {
    /// The sender or recipient address could not be parsed.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The message could not be assembled.
    #[error("Failed to build message: {0}")]
    Build(String),

    /// The relay refused or the connection failed.
    #[error("{0}")]
    Transport(String),

    /// The transport could not be constructed from configuration.
    #[error("Mailer configuration error: {0}")]
    Config(String),
}

impl From<lettre::transport::smtp::Error> for MailerError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        MailerError::Transport(err.to_string())
    }
}

impl From<lettre::error::Error> for MailerError {
    fn from(err: lettre::error::Error) -> Self {
        MailerError::Build(err.to_string())
    }
}
