//! In-memory transport that records envelopes instead of sending them.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Envelope, Mailer, MailerError};

/// A message captured by [`MemoryMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

type SendHook = Box<dyn Fn(&Envelope<'_>) + Send + Sync>;

/// Records every accepted envelope and fails the addresses it was told to.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentMessage>>,
    failures: Mutex<HashMap<String, String>>,
    hook: Option<SendHook>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `hook` at the start of every send, before the outcome is
    /// decided.
    pub fn on_send(mut self, hook: impl Fn(&Envelope<'_>) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Makes every send to `address` fail with `reason`.
    pub fn fail_for(&self, address: &str, reason: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.to_string(), reason.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recipient addresses in send order.
    pub fn sent_to(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.to).collect()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, envelope: &Envelope<'_>) -> Result<String, MailerError> {
        if let Some(hook) = &self.hook {
            hook(envelope);
        }

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(envelope.to)
            .cloned();
        if let Some(reason) = failure {
            return Err(MailerError::Transport(reason));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                from: envelope.from.to_string(),
                to: envelope.to.to_string(),
                subject: envelope.subject.to_string(),
                body: envelope.body.to_string(),
            });
        Ok("250 Ok: queued".to_string())
    }
}
