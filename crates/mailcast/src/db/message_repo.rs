//! Message repository: subject/body templates that back mailings.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::model::{Message, NewMessage};

impl Message {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            subject: row.get("subject")?,
            body: row.get("body")?,
            owner_id: row.get("owner_id")?,
        })
    }
}

pub fn insert(db: &Database, new: &NewMessage) -> Result<Message, DatabaseError> {
    if new.subject.trim().is_empty() {
        return Err(DatabaseError::Constraint(
            "message subject must not be empty".to_string(),
        ));
    }
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO messages (subject, body, owner_id) VALUES (?1, ?2, ?3)",
            params![new.subject, new.body, new.owner_id],
        )?;
        Ok(Message {
            id: conn.last_insert_rowid(),
            subject: new.subject.clone(),
            body: new.body.clone(),
            owner_id: new.owner_id,
        })
    })
}

/// Explicit edit. Every mailing that references the message sends the
/// new text from its next dispatch on.
pub fn update(db: &Database, message: &Message) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE messages SET subject = ?2, body = ?3, owner_id = ?4 WHERE id = ?1",
            params![message.id, message.subject, message.body, message.owner_id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "message",
                id: message.id,
            });
        }
        Ok(())
    })
}

/// Deletes a message together with the mailings built on it.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Message>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM messages WHERE id = ?1",
                params![id],
                Message::from_row,
            )
            .optional()?)
    })
}

pub fn list(db: &Database, owner_id: Option<i64>) -> Result<Vec<Message>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM messages WHERE (?1 IS NULL OR owner_id = ?1) ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![owner_id], Message::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample() -> NewMessage {
        NewMessage {
            subject: "Spring sale".to_string(),
            body: "Everything is 20% off this week.".to_string(),
            owner_id: None,
        }
    }

    #[test]
    fn test_insert_find_update() {
        let db = test_db();
        let mut m = insert(&db, &sample()).unwrap();
        assert_eq!(find_by_id(&db, m.id).unwrap().unwrap(), m);

        m.body = "Extended until Sunday.".to_string();
        update(&db, &m).unwrap();
        assert_eq!(
            find_by_id(&db, m.id).unwrap().unwrap().body,
            "Extended until Sunday."
        );
    }

    #[test]
    fn test_empty_subject_rejected() {
        let db = test_db();
        let mut new = sample();
        new.subject = "   ".to_string();
        assert!(matches!(insert(&db, &new), Err(DatabaseError::Constraint(_))));
    }

    #[test]
    fn test_list_and_delete() {
        let db = test_db();
        let a = insert(&db, &sample()).unwrap();
        insert(&db, &sample()).unwrap();
        assert_eq!(list(&db, None).unwrap().len(), 2);
        assert!(list(&db, Some(1)).unwrap().is_empty());

        assert!(delete(&db, a.id).unwrap());
        assert_eq!(list(&db, None).unwrap().len(), 1);
    }
}
