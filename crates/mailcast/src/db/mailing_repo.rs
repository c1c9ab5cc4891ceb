//! Mailing repository: mailings, their recipient sets, and the
//! status queries the dispatcher runs every tick.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_ts, get_parsed, get_ts, Database, DatabaseError};
use crate::model::{Mailing, MailingStatus, NewMailing, Recipient, Window};

impl Mailing {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            first_send_time: get_ts(row, "first_send_time")?,
            end_time: get_ts(row, "end_time")?,
            status: get_parsed(row, "status")?,
            message_id: row.get("message_id")?,
            owner_id: row.get("owner_id")?,
        })
    }
}

fn checked_window(window: &Window) -> Result<Window, DatabaseError> {
    Window::new(window.first_send_time, window.end_time)
        .map_err(|e| DatabaseError::Constraint(e.to_string()))
}

/// Inserts a mailing in status `Created` along with its recipient set.
///
/// The window is re-validated here because the table itself does not
/// enforce `first_send_time < end_time`.
pub fn insert(db: &Database, new: &NewMailing) -> Result<Mailing, DatabaseError> {
    let window = checked_window(&new.window)?;

    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO mailings (first_send_time, end_time, status, message_id, owner_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                format_ts(&window.first_send_time),
                format_ts(&window.end_time),
                MailingStatus::Created.as_str(),
                new.message_id,
                new.owner_id,
            ],
        )
        .map_err(|e| DatabaseError::from_insert(e, "mailing references a missing row"))?;
        let id = tx.last_insert_rowid();

        for recipient_id in &new.recipient_ids {
            tx.execute(
                "INSERT OR IGNORE INTO mailing_recipients (mailing_id, recipient_id)
                 VALUES (?1, ?2)",
                params![id, recipient_id],
            )
            .map_err(|e| DatabaseError::from_insert(e, "unknown recipient"))?;
        }
        tx.commit()?;

        Ok(Mailing {
            id,
            first_send_time: window.first_send_time,
            end_time: window.end_time,
            status: MailingStatus::Created,
            message_id: new.message_id,
            owner_id: new.owner_id,
        })
    })
}

/// Moves the send window of an existing mailing.
pub fn update_window(db: &Database, id: i64, window: &Window) -> Result<(), DatabaseError> {
    let window = checked_window(window)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE mailings SET first_send_time = ?2, end_time = ?3 WHERE id = ?1",
            params![
                id,
                format_ts(&window.first_send_time),
                format_ts(&window.end_time)
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "mailing",
                id,
            });
        }
        Ok(())
    })
}

/// Points a mailing at a different message.
pub fn update_message(db: &Database, id: i64, message_id: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn
            .execute(
                "UPDATE mailings SET message_id = ?2 WHERE id = ?1",
                params![id, message_id],
            )
            .map_err(|e| DatabaseError::from_insert(e, "unknown message"))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "mailing",
                id,
            });
        }
        Ok(())
    })
}

/// Deletes a mailing together with its attempts and recipient links.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM mailings WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Mailing>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM mailings WHERE id = ?1",
                params![id],
                Mailing::from_row,
            )
            .optional()?)
    })
}

/// Lists mailings, optionally restricted to one owner.
pub fn list(db: &Database, owner_id: Option<i64>) -> Result<Vec<Mailing>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM mailings WHERE (?1 IS NULL OR owner_id = ?1) ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![owner_id], Mailing::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Replaces the whole recipient set of a mailing.
pub fn set_recipients(
    db: &Database,
    mailing_id: i64,
    recipient_ids: &[i64],
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM mailing_recipients WHERE mailing_id = ?1",
            params![mailing_id],
        )?;
        for recipient_id in recipient_ids {
            tx.execute(
                "INSERT OR IGNORE INTO mailing_recipients (mailing_id, recipient_id)
                 VALUES (?1, ?2)",
                params![mailing_id, recipient_id],
            )
            .map_err(|e| DatabaseError::from_insert(e, "unknown mailing or recipient"))?;
        }
        tx.commit()?;
        Ok(())
    })
}

pub fn add_recipient(
    db: &Database,
    mailing_id: i64,
    recipient_id: i64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO mailing_recipients (mailing_id, recipient_id)
             VALUES (?1, ?2)",
            params![mailing_id, recipient_id],
        )
        .map_err(|e| DatabaseError::from_insert(e, "unknown mailing or recipient"))?;
        Ok(())
    })
}

pub fn remove_recipient(
    db: &Database,
    mailing_id: i64,
    recipient_id: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM mailing_recipients WHERE mailing_id = ?1 AND recipient_id = ?2",
            params![mailing_id, recipient_id],
        )?;
        Ok(changed > 0)
    })
}

/// The recipients currently linked to a mailing, read fresh on every call.
pub fn recipients_of(db: &Database, mailing_id: i64) -> Result<Vec<Recipient>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT r.id, r.email, r.full_name, r.comment, r.owner_id
             FROM recipients r
             JOIN mailing_recipients mr ON mr.recipient_id = r.id
             WHERE mr.mailing_id = ?1
             ORDER BY r.id",
        )?;
        let rows = stmt
            .query_map(params![mailing_id], |row| {
                Ok(Recipient {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    full_name: row.get(2)?,
                    comment: row.get(3)?,
                    owner_id: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Mailings that are `Created` or `Running` and whose window contains `now`.
///
/// Uses the same half-open `[first_send_time, end_time)` bounds as
/// [`Window::contains`].
pub fn find_due(db: &Database, now: DateTime<Utc>) -> Result<Vec<Mailing>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM mailings
             WHERE status IN (?1, ?2) AND first_send_time <= ?3 AND end_time > ?3
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(
                params![
                    MailingStatus::Created.as_str(),
                    MailingStatus::Running.as_str(),
                    format_ts(&now)
                ],
                Mailing::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Moves a mailing from `from` to `to` if it is still in `from`.
///
/// Returns whether a row changed. Refuses transitions that would break
/// the forward-only lifecycle.
pub fn transition_status(
    db: &Database,
    id: i64,
    from: MailingStatus,
    to: MailingStatus,
) -> Result<bool, DatabaseError> {
    if !from.can_transition_to(to) {
        return Err(DatabaseError::Constraint(format!(
            "mailing {} cannot move from {} to {}",
            id, from, to
        )));
    }
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE mailings SET status = ?3 WHERE id = ?1 AND status = ?2",
            params![id, from.as_str(), to.as_str()],
        )?;
        Ok(changed > 0)
    })
}

/// Bulk-completes every `Running` mailing whose window has closed.
/// Returns the number of mailings completed.
pub fn complete_expired(db: &Database, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE mailings SET status = ?1 WHERE status = ?2 AND end_time <= ?3",
            params![
                MailingStatus::Completed.as_str(),
                MailingStatus::Running.as_str(),
                format_ts(&now)
            ],
        )?;
        Ok(changed as u64)
    })
}

/// Counts mailings with the given status.
pub fn count_by_status(db: &Database, status: MailingStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM mailings WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
