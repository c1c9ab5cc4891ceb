//! Dashboard statistics: aggregate counts over mailings, recipients and
//! attempts, either across the whole store or for one owner.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};
use crate::model::{AttemptStatus, MailingStatus};

/// Aggregate counts shown on the home page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailingSummary {
    pub total_mailings: u64,
    /// Mailings currently in `Running`.
    pub active_mailings: u64,
    pub unique_recipients: u64,
    pub successful_attempts: u64,
    pub failed_attempts: u64,
}

/// Computes the summary. With `owner_id`, only rows owned by that user
/// count (attempts count through their mailing's owner).
pub fn summary(db: &Database, owner_id: Option<i64>) -> Result<MailingSummary, DatabaseError> {
    db.with_conn(|conn| {
        let (total_mailings, active_mailings): (u64, u64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(status = ?2), 0)
             FROM mailings WHERE (?1 IS NULL OR owner_id = ?1)",
            params![owner_id, MailingStatus::Running.as_str()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let unique_recipients: u64 = conn.query_row(
            "SELECT COUNT(DISTINCT email) FROM recipients WHERE (?1 IS NULL OR owner_id = ?1)",
            params![owner_id],
            |r| r.get(0),
        )?;

        let (successful_attempts, failed_attempts): (u64, u64) = conn.query_row(
            "SELECT COALESCE(SUM(a.status = ?2), 0), COALESCE(SUM(a.status = ?3), 0)
             FROM mailing_attempts a
             JOIN mailings m ON m.id = a.mailing_id
             WHERE (?1 IS NULL OR m.owner_id = ?1)",
            params![
                owner_id,
                AttemptStatus::Success.as_str(),
                AttemptStatus::Failure.as_str()
            ],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        Ok(MailingSummary {
            total_mailings,
            active_mailings,
            unique_recipients,
            successful_attempts,
            failed_attempts,
        })
    })
}
