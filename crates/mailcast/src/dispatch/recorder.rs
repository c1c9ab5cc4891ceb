//! Attempt recording.

use chrono::{DateTime, Utc};

use crate::db::{attempt_repo, Database, DatabaseError};
use crate::model::{AttemptStatus, MailingAttempt};

/// Stored as the server response of every successful attempt.
pub const SUCCESS_RESPONSE: &str = "Message sent";

/// Persists one transmission outcome.
///
/// A storage failure here is returned, not retried: the caller treats it as
/// fatal for the current dispatch.
pub fn record(
    db: &Database,
    mailing_id: i64,
    outcome: AttemptStatus,
    detail: &str,
    at: DateTime<Utc>,
) -> Result<MailingAttempt, DatabaseError> {
    let attempt = attempt_repo::insert(db, mailing_id, outcome, detail, at)?;
    log::debug!(
        "Recorded {} attempt {} for mailing {}",
        outcome,
        attempt.id,
        mailing_id
    );
    Ok(attempt)
}
