//! Outbound mail transmission.
//!
//! The dispatcher talks to a [`Mailer`]: one synchronous call per
//! recipient, no retry. [`SmtpMailer`] relays through an SMTP server,
//! [`LogMailer`] only writes the envelope to the log and [`MemoryMailer`]
//! keeps it in memory.

pub mod error;
pub mod memory;
pub mod smtp;

use std::sync::Arc;

pub use error::MailerError;
pub use memory::{MemoryMailer, SentMessage};
pub use smtp::SmtpMailer;

use crate::config::{Config, TransportKind};

use tracing::info;

/// One message to one recipient.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    pub from: &'a str,
    pub to: &'a str,
}

/// Sends a single envelope.
///
/// Returns the server's response text on success.
pub trait Mailer: Send + Sync {
    fn send(&self, envelope: &Envelope<'_>) -> Result<String, MailerError>;
}

/// Development transport: logs the envelope and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, envelope: &Envelope<'_>) -> Result<String, MailerError> {
        info!(
            from = envelope.from,
            to = envelope.to,
            subject = envelope.subject,
            body_len = envelope.body.len(),
            "Message logged instead of sent"
        );
        Ok("logged".to_string())
    }
}

/// Builds the transport selected in the config.
pub fn from_config(config: &Config) -> Result<Arc<dyn Mailer>, MailerError> {
    Ok(match config.transport {
        TransportKind::Smtp => Arc::new(SmtpMailer::from_config(&config.smtp)?),
        TransportKind::Log => Arc::new(LogMailer),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_mailer_always_succeeds() {
        let envelope = Envelope {
            subject: "Hi",
            body: "Body",
            from: "noreply@example.com",
            to: "someone@example.com",
        };
        assert_eq!(LogMailer.send(&envelope).unwrap(), "logged");
    }

    #[test]
    fn test_from_config_defaults_to_log_transport() {
        let mailer = from_config(&Config::default()).unwrap();
        let envelope = Envelope {
            subject: "s",
            body: "b",
            from: "a@example.com",
            to: "b@example.com",
        };
        assert_eq!(mailer.send(&envelope).unwrap(), "logged");
    }

    #[test]
    fn test_transport_error_displays_bare_reason() {
        let err = MailerError::Transport("SMTP timeout".to_string());
        assert_eq!(err.to_string(), "SMTP timeout");
    }
}
