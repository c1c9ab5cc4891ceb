//! Short-lived per-mailing claims.
//!
//! A claim row marks a mailing as being dispatched by one holder, so the
//! scheduler and a manual "send now" cannot run the recipient loop of the
//! same mailing at once. Claims older than the TTL are considered
//! abandoned (crashed holder) and may be taken over.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_ts, get_ts, Database, DatabaseError};

/// Current holder of a mailing claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub mailing_id: i64,
    pub claimed_by: String,
    pub claimed_at: DateTime<Utc>,
}

/// Tries to claim `mailing_id` for `holder`. Returns `true` if the claim
/// was taken, `false` if someone else holds a live claim.
pub fn try_claim(
    db: &Database,
    mailing_id: i64,
    holder: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<bool, DatabaseError> {
    let stale_before = format_ts(&(now - ttl));
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let expired = tx.execute(
            "DELETE FROM mailing_claims WHERE mailing_id = ?1 AND claimed_at < ?2",
            params![mailing_id, stale_before],
        )?;
        if expired > 0 {
            log::warn!("Took over stale claim on mailing {}", mailing_id);
        }
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO mailing_claims (mailing_id, claimed_by, claimed_at)
                 VALUES (?1, ?2, ?3)",
                params![mailing_id, holder, format_ts(&now)],
            )
            .map_err(|e| DatabaseError::from_insert(e, "claim for a missing mailing"))?;
        tx.commit()?;
        Ok(inserted == 1)
    })
}

/// Releases a claim held by `holder`. Releasing someone else's claim, or a
/// claim that is gone, does nothing.
pub fn release(db: &Database, mailing_id: i64, holder: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM mailing_claims WHERE mailing_id = ?1 AND claimed_by = ?2",
            params![mailing_id, holder],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, mailing_id: i64) -> Result<Option<Claim>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT mailing_id, claimed_by, claimed_at FROM mailing_claims
                 WHERE mailing_id = ?1",
                params![mailing_id],
                |row| {
                    Ok(Claim {
                        mailing_id: row.get("mailing_id")?,
                        claimed_by: row.get("claimed_by")?,
                        claimed_at: get_ts(row, "claimed_at")?,
                    })
                },
            )
            .optional()?)
    })
}
