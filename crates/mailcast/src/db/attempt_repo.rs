//! Attempt repository: append-only delivery outcomes.
//!
//! Rows are only ever inserted; nothing in the crate updates or deletes
//! an attempt (they go away with their mailing).

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{format_ts, get_parsed, get_ts, Database, DatabaseError};
use crate::model::{AttemptStatus, MailingAttempt};

impl MailingAttempt {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            attempt_time: get_ts(row, "attempt_time")?,
            status: get_parsed(row, "status")?,
            server_response: row.get("server_response")?,
            mailing_id: row.get("mailing_id")?,
        })
    }
}

/// Inserts one attempt row and returns it.
pub fn insert(
    db: &Database,
    mailing_id: i64,
    status: AttemptStatus,
    server_response: &str,
    attempt_time: DateTime<Utc>,
) -> Result<MailingAttempt, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO mailing_attempts (attempt_time, status, server_response, mailing_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                format_ts(&attempt_time),
                status.as_str(),
                server_response,
                mailing_id
            ],
        )
        .map_err(|e| DatabaseError::from_insert(e, "attempt references a missing mailing"))?;
        Ok(MailingAttempt {
            id: conn.last_insert_rowid(),
            attempt_time,
            status,
            server_response: Some(server_response.to_string()),
            mailing_id,
        })
    })
}

/// All attempts of one mailing, oldest first.
pub fn list_for_mailing(
    db: &Database,
    mailing_id: i64,
) -> Result<Vec<MailingAttempt>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM mailing_attempts WHERE mailing_id = ?1 ORDER BY attempt_time, id",
        )?;
        let rows = stmt
            .query_map(params![mailing_id], MailingAttempt::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Attempt report: every attempt, or only those of mailings owned by
/// `owner_id`. Newest first.
pub fn list(db: &Database, owner_id: Option<i64>) -> Result<Vec<MailingAttempt>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT a.* FROM mailing_attempts a
             JOIN mailings m ON m.id = a.mailing_id
             WHERE (?1 IS NULL OR m.owner_id = ?1)
             ORDER BY a.attempt_time DESC, a.id DESC",
        )?;
        let rows = stmt
            .query_map(params![owner_id], MailingAttempt::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts attempts of one mailing, optionally only those with `status`.
pub fn count_for_mailing(
    db: &Database,
    mailing_id: i64,
    status: Option<AttemptStatus>,
) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM mailing_attempts
             WHERE mailing_id = ?1 AND (?2 IS NULL OR status = ?2)",
            params![mailing_id, status.map(|s| s.as_str())],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{mailing_repo, message_repo, user_repo};
    use crate::model::{NewMailing, NewMessage, Window};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap()
    }

    fn setup(owner_id: Option<i64>, db: &Database) -> i64 {
        let message = message_repo::insert(
            db,
            &NewMessage {
                subject: "s".to_string(),
                body: "b".to_string(),
                owner_id,
            },
        )
        .unwrap();
        mailing_repo::insert(
            db,
            &NewMailing {
                window: Window::new(t0(), t0() + Duration::hours(1)).unwrap(),
                message_id: message.id,
                owner_id,
                recipient_ids: vec![],
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_insert_and_list_for_mailing() {
        let db = Database::open_in_memory().unwrap();
        let mailing_id = setup(None, &db);

        insert(&db, mailing_id, AttemptStatus::Success, "Message sent", t0()).unwrap();
        insert(
            &db,
            mailing_id,
            AttemptStatus::Failure,
            "SMTP timeout",
            t0() + Duration::seconds(1),
        )
        .unwrap();

        let attempts = list_for_mailing(&db, mailing_id).unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].status, AttemptStatus::Success);
        assert_eq!(attempts[1].server_response.as_deref(), Some("SMTP timeout"));
        assert_eq!(attempts[1].attempt_time, t0() + Duration::seconds(1));

        assert_eq!(count_for_mailing(&db, mailing_id, None).unwrap(), 2);
        assert_eq!(
            count_for_mailing(&db, mailing_id, Some(AttemptStatus::Failure)).unwrap(),
            1
        );
    }

    #[test]
    fn test_insert_for_missing_mailing_fails() {
        let db = Database::open_in_memory().unwrap();
        let err = insert(&db, 12, AttemptStatus::Success, "Message sent", t0()).unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[test]
    fn test_list_scoped_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let owner = user_repo::insert(&db, "owner@example.com", false, t0()).unwrap();
        let mine = setup(Some(owner.id), &db);
        let theirs = setup(None, &db);

        insert(&db, mine, AttemptStatus::Success, "Message sent", t0()).unwrap();
        insert(&db, theirs, AttemptStatus::Success, "Message sent", t0()).unwrap();

        assert_eq!(list(&db, None).unwrap().len(), 2);
        let scoped = list(&db, Some(owner.id)).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].mailing_id, mine);
    }
}
