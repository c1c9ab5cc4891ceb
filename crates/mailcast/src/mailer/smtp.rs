//! SMTP relay transport.

use std::time::Duration;

use lettre::message::header::{ContentType, MessageId};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::response::Response;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::debug;

use super::{Envelope, Mailer, MailerError};
use crate::config::{SmtpConfig, TlsMode};

pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    /// Builds the transport. Credentials are resolved here, once, so a bad
    /// secret source fails at startup instead of on the first recipient.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailerError> {
        let mut builder = SmtpTransport::builder_dangerous(&config.host).port(config.port);

        builder = match config.tls {
            TlsMode::None => builder.tls(Tls::None),
            TlsMode::Opportunistic => builder.tls(Tls::Opportunistic(tls_parameters(config)?)),
            TlsMode::Starttls => builder.tls(Tls::Required(tls_parameters(config)?)),
            TlsMode::Wrapper => builder.tls(Tls::Wrapper(tls_parameters(config)?)),
        };

        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Some(Duration::from_secs(secs)));
        }

        if let Some(username) = &config.username {
            let password = config
                .password
                .resolve()
                .map_err(|e| MailerError::Config(e.to_string()))?;
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn tls_parameters(config: &SmtpConfig) -> Result<TlsParameters, MailerError> {
    TlsParameters::new(config.host.clone()).map_err(|e| MailerError::Config(e.to_string()))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailerError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| MailerError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Assembles a plain-text message with a generated Message-Id.
pub(crate) fn build_message(envelope: &Envelope<'_>) -> Result<Message, MailerError> {
    let from = parse_mailbox(envelope.from)?;
    let to = parse_mailbox(envelope.to)?;
    let domain = envelope
        .from
        .rsplit_once('@')
        .map(|(_, d)| d.trim_end_matches('>'))
        .unwrap_or("localhost");
    let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), domain);

    Ok(Message::builder()
        .from(from)
        .to(to)
        .subject(envelope.subject)
        .header(MessageId::from(message_id))
        .header(ContentType::TEXT_PLAIN)
        .body(envelope.body.to_string())?)
}

impl Mailer for SmtpMailer {
    fn send(&self, envelope: &Envelope<'_>) -> Result<String, MailerError> {
        let message = build_message(envelope)?;
        let response = self.transport.send(&message)?;
        debug!(to = envelope.to, code = %response.code(), "SMTP accepted message");
        Ok(response_text(&response))
    }
}

/// Reply code followed by the reply lines, joined with spaces.
fn response_text(response: &Response) -> String {
    let lines = response.message().collect::<Vec<_>>().join(" ");
    format!("{} {}", response.code(), lines)
}
