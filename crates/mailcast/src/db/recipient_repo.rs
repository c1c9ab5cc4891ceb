//! Recipient repository: CRUD operations for the `recipients` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::model::{NewRecipient, Recipient};

impl Recipient {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            full_name: row.get("full_name")?,
            comment: row.get("comment")?,
            owner_id: row.get("owner_id")?,
        })
    }
}

/// Inserts a recipient. The email address must not already be registered.
pub fn insert(db: &Database, new: &NewRecipient) -> Result<Recipient, DatabaseError> {
    let email = new.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(DatabaseError::Constraint(format!(
            "invalid recipient email '{}'",
            new.email
        )));
    }

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO recipients (email, full_name, comment, owner_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![email, new.full_name, new.comment, new.owner_id],
        )
        .map_err(|e| DatabaseError::from_insert(e, "recipient email already exists"))?;
        Ok(Recipient {
            id: conn.last_insert_rowid(),
            email,
            full_name: new.full_name.clone(),
            comment: new.comment.clone(),
            owner_id: new.owner_id,
        })
    })
}

/// Overwrites every editable field of an existing recipient.
pub fn update(db: &Database, recipient: &Recipient) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn
            .execute(
                "UPDATE recipients SET email = ?2, full_name = ?3, comment = ?4, owner_id = ?5
                 WHERE id = ?1",
                params![
                    recipient.id,
                    recipient.email,
                    recipient.full_name,
                    recipient.comment,
                    recipient.owner_id,
                ],
            )
            .map_err(|e| DatabaseError::from_insert(e, "recipient email already exists"))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "recipient",
                id: recipient.id,
            });
        }
        Ok(())
    })
}

/// Deletes a recipient; it disappears from every mailing's recipient set.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM recipients WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Recipient>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM recipients WHERE id = ?1",
                params![id],
                Recipient::from_row,
            )
            .optional()?)
    })
}

/// Lists recipients, optionally restricted to one owner.
pub fn list(db: &Database, owner_id: Option<i64>) -> Result<Vec<Recipient>, DatabaseError> {
    db.with_conn(|conn| {
        let rows = match owner_id {
            Some(owner) => {
                let mut stmt =
                    conn.prepare("SELECT * FROM recipients WHERE owner_id = ?1 ORDER BY id")?;
                let rows = stmt
                    .query_map(params![owner], Recipient::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare("SELECT * FROM recipients ORDER BY id")?;
                let rows = stmt
                    .query_map([], Recipient::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    })
}
