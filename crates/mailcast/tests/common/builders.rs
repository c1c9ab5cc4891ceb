//! Builders for test data.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

use mailcast::db::{mailing_repo, message_repo};
use mailcast::model::{Mailing, NewMailing, NewMessage, Window};

use super::harness::{t0, TestHarness};

/// Builds a mailing with its message in one go. The default window is
/// `[T, T+1h)` and there are no recipients.
pub struct MailingBuilder<'a> {
    harness: &'a TestHarness,
    subject: String,
    body: String,
    owner_id: Option<i64>,
    first_send_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    recipient_ids: Vec<i64>,
}

impl<'a> MailingBuilder<'a> {
    pub fn new(harness: &'a TestHarness) -> Self {
        Self {
            harness,
            subject: "Spring sale".to_string(),
            body: "Everything must go.".to_string(),
            owner_id: None,
            first_send_time: t0(),
            end_time: t0() + Duration::hours(1),
            recipient_ids: vec![],
        }
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn owner(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Window relative to `T`.
    pub fn window(mut self, start: Duration, end: Duration) -> Self {
        self.first_send_time = t0() + start;
        self.end_time = t0() + end;
        self
    }

    pub fn recipients(mut self, emails: &[&str]) -> Self {
        self.recipient_ids.extend(self.harness.recipients(emails));
        self
    }

    pub fn create(self) -> Mailing {
        let message = message_repo::insert(
            &self.harness.db,
            &NewMessage {
                subject: self.subject,
                body: self.body,
                owner_id: self.owner_id,
            },
        )
        .expect("Failed to insert message");
        mailing_repo::insert(
            &self.harness.db,
            &NewMailing {
                window: Window::new(self.first_send_time, self.end_time)
                    .expect("Invalid test window"),
                message_id: message.id,
                owner_id: self.owner_id,
                recipient_ids: self.recipient_ids,
            },
        )
        .expect("Failed to insert mailing")
    }
}

/// Writes a config file into `dir` and returns its path.
pub fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("Failed to create config file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config file");
    path
}
