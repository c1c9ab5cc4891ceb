//! Mailing dispatch.
//!
//! [`Dispatcher::execute_send`] is the recipient loop shared by both entry
//! points:
//!
//! - [`Dispatcher::send_mailing`], the scheduled path, which re-checks the
//!   send window first;
//! - [`Dispatcher::send_now`], the manual path, which does not.
//!
//! [`Dispatcher::process_due`] is one batch pass over every due mailing.
//! Each recipient is isolated: a rejected address becomes a `Failure`
//! attempt and the loop continues. Both paths hold a per-mailing claim for
//! the duration of the loop so they never run the same mailing at once.

pub mod batch;
pub mod error;
pub mod recorder;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn};

pub use batch::BatchReport;
pub use error::DispatchError;
pub use recorder::{record, SUCCESS_RESPONSE};

use crate::clock::{Clock, SystemClock};
use crate::db::{claim_repo, mailing_repo, message_repo, Database};
use crate::mailer::{Envelope, Mailer};
use crate::model::{AttemptStatus, Mailing, MailingStatus};

/// Outcome of one pass of the recipient loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub mailing_id: i64,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Status of the mailing after the loop.
    pub status: MailingStatus,
}

#[derive(Clone)]
pub struct Dispatcher {
    db: Database,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    from_address: String,
    claim_ttl: Duration,
    holder_id: String,
}

impl Dispatcher {
    pub fn new(db: Database, mailer: Arc<dyn Mailer>, from_address: impl Into<String>) -> Self {
        Self {
            db,
            mailer,
            clock: Arc::new(SystemClock),
            from_address: from_address.into(),
            claim_ttl: Duration::minutes(15),
            holder_id: format!("dispatcher-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_claim_ttl(mut self, ttl: Duration) -> Self {
        self.claim_ttl = ttl;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Identifies this dispatcher in `mailing_claims`.
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Sends the mailing's message to every recipient currently in its set
    /// and records one attempt per recipient.
    ///
    /// Performs no window check and takes no claim. Afterwards a `Created`
    /// mailing becomes `Running`; any other status is left alone.
    pub fn execute_send(&self, mailing: &Mailing) -> Result<DispatchReport, DispatchError> {
        let message = message_repo::find_by_id(&self.db, mailing.message_id)?.ok_or(
            DispatchError::MessageNotFound {
                mailing_id: mailing.id,
                message_id: mailing.message_id,
            },
        )?;
        let recipients = mailing_repo::recipients_of(&self.db, mailing.id)?;

        let span = info_span!(
            "dispatch",
            mailing_id = mailing.id,
            recipients = recipients.len()
        );
        let _enter = span.enter();

        let mut report = DispatchReport {
            mailing_id: mailing.id,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            status: mailing.status,
        };

        for recipient in &recipients {
            let envelope = Envelope {
                subject: &message.subject,
                body: &message.body,
                from: &self.from_address,
                to: &recipient.email,
            };
            report.attempted += 1;

            match self.mailer.send(&envelope) {
                Ok(response) => {
                    record(
                        &self.db,
                        mailing.id,
                        AttemptStatus::Success,
                        SUCCESS_RESPONSE,
                        self.clock.now(),
                    )?;
                    report.succeeded += 1;
                    info!(to = %recipient.email, response = %response, "Message sent");
                }
                Err(e) => {
                    let detail = e.to_string();
                    record(
                        &self.db,
                        mailing.id,
                        AttemptStatus::Failure,
                        &detail,
                        self.clock.now(),
                    )?;
                    report.failed += 1;
                    warn!(to = %recipient.email, error = %detail, "Message failed");
                }
            }
        }

        if mailing.status == MailingStatus::Created {
            let advanced = mailing_repo::transition_status(
                &self.db,
                mailing.id,
                MailingStatus::Created,
                MailingStatus::Running,
            )?;
            if advanced {
                info!("Mailing is now running");
            }
        }
        report.status = mailing_repo::find_by_id(&self.db, mailing.id)?
            .map(|m| m.status)
            .unwrap_or(report.status);

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            status = %report.status,
            "Dispatch finished"
        );
        Ok(report)
    }

    /// Scheduled dispatch of one mailing.
    ///
    /// Returns `None` without touching the mailing when `now` falls outside
    /// its window or another dispatcher holds its claim.
    pub fn send_mailing(
        &self,
        mailing: &Mailing,
        now: DateTime<Utc>,
    ) -> Result<Option<DispatchReport>, DispatchError> {
        if !mailing.window().contains(now) {
            info!(
                mailing_id = mailing.id,
                "Send window is not open, skipping mailing"
            );
            return Ok(None);
        }

        let report = self.with_claim(mailing.id, || self.execute_send(mailing))?;
        if report.is_none() {
            warn!(
                mailing_id = mailing.id,
                "Mailing is being dispatched elsewhere, skipping"
            );
        }
        Ok(report)
    }

    /// Manual dispatch: sends immediately regardless of window or status.
    pub fn send_now(&self, mailing_id: i64) -> Result<DispatchReport, DispatchError> {
        let mailing = mailing_repo::find_by_id(&self.db, mailing_id)?
            .ok_or(DispatchError::MailingNotFound(mailing_id))?;
        info!(mailing_id, status = %mailing.status, "Manual dispatch requested");

        self.with_claim(mailing.id, || self.execute_send(&mailing))?
            .ok_or(DispatchError::Busy(mailing_id))
    }

    /// Runs `f` while holding the claim on `mailing_id`. `None` if the claim
    /// is held by someone else.
    fn with_claim<T>(
        &self,
        mailing_id: i64,
        f: impl FnOnce() -> Result<T, DispatchError>,
    ) -> Result<Option<T>, DispatchError> {
        let claimed = claim_repo::try_claim(
            &self.db,
            mailing_id,
            &self.holder_id,
            self.clock.now(),
            self.claim_ttl,
        )?;
        if !claimed {
            return Ok(None);
        }

        let result = f();
        self.release_claim(mailing_id);
        result.map(Some)
    }

    /// Releases the claim, retrying once. A claim that cannot be released
    /// blocks the mailing until it goes stale.
    fn release_claim(&self, mailing_id: i64) {
        let first = match claim_repo::release(&self.db, mailing_id, &self.holder_id) {
            Ok(_) => return,
            Err(e) => e,
        };
        warn!(mailing_id, error = %first, "Failed to release dispatch claim, retrying");
        if let Err(e) = claim_repo::release(&self.db, mailing_id, &self.holder_id) {
            tracing::error!(
                mailing_id,
                claim_ttl_secs = self.claim_ttl.num_seconds(),
                error = %e,
                "Dispatch claim left in place; mailing {} is blocked for up to {}s",
                mailing_id,
                self.claim_ttl.num_seconds()
            );
        }
    }
}
