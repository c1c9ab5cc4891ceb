//! User repository: accounts that own mailings and hold permissions.
//!
//! Registration and login live outside this crate; the dispatch side only
//! needs ownership and the capability codenames.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_ts, get_ts, Database, DatabaseError};
use crate::model::User;

fn from_row(row: &Row<'_>) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get("id")?,
        email: row.get("email")?,
        is_superuser: row.get("is_superuser")?,
        is_active: row.get("is_active")?,
        created_at: get_ts(row, "created_at")?,
    })
}

/// Inserts a user. Emails are normalized to lowercase and must be unique.
pub fn insert(
    db: &Database,
    email: &str,
    is_superuser: bool,
    created_at: DateTime<Utc>,
) -> Result<User, DatabaseError> {
    let email = email.trim().to_lowercase();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (email, is_superuser, is_active, created_at)
             VALUES (?1, ?2, 1, ?3)",
            params![email, is_superuser, format_ts(&created_at)],
        )
        .map_err(|e| DatabaseError::from_insert(e, "user email already registered"))?;
        Ok(User {
            id: conn.last_insert_rowid(),
            email,
            is_superuser,
            is_active: true,
            created_at,
        })
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<User>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row("SELECT * FROM users WHERE id = ?1", params![id], from_row)
            .optional()?)
    })
}

pub fn find_by_email(db: &Database, email: &str) -> Result<Option<User>, DatabaseError> {
    let email = email.trim().to_lowercase();
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM users WHERE email = ?1",
                params![email],
                from_row,
            )
            .optional()?)
    })
}

/// Blocks or unblocks a user.
pub fn set_active(db: &Database, id: i64, active: bool) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE users SET is_active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "user", id });
        }
        Ok(())
    })
}

/// Grants a permission codename. Granting twice is a no-op.
pub fn grant_permission(db: &Database, user_id: i64, codename: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO user_permissions (user_id, codename) VALUES (?1, ?2)",
            params![user_id, codename],
        )?;
        Ok(())
    })
}

pub fn revoke_permission(
    db: &Database,
    user_id: i64,
    codename: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM user_permissions WHERE user_id = ?1 AND codename = ?2",
            params![user_id, codename],
        )?;
        Ok(())
    })
}

/// Returns all permission codenames held by a user, sorted.
pub fn permissions_for(db: &Database, user_id: i64) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT codename FROM user_permissions WHERE user_id = ?1 ORDER BY codename",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
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

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let user = insert(&db, " Owner@Example.com ", false, Utc::now()).unwrap();
        assert_eq!(user.email, "owner@example.com");

        let by_id = find_by_id(&db, user.id).unwrap().unwrap();
        assert_eq!(by_id.email, "owner@example.com");
        assert!(by_id.is_active);

        let by_email = find_by_email(&db, "OWNER@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert!(find_by_email(&db, "nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_is_constraint_error() {
        let db = test_db();
        insert(&db, "a@example.com", false, Utc::now()).unwrap();
        let err = insert(&db, "a@example.com", true, Utc::now()).unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[test]
    fn test_permissions_grant_and_revoke() {
        let db = test_db();
        let user = insert(&db, "m@example.com", false, Utc::now()).unwrap();

        grant_permission(&db, user.id, "can_disable_mailings").unwrap();
        grant_permission(&db, user.id, "can_disable_mailings").unwrap();
        grant_permission(&db, user.id, "can_view_all_mailings").unwrap();
        assert_eq!(
            permissions_for(&db, user.id).unwrap(),
            vec!["can_disable_mailings", "can_view_all_mailings"]
        );

        revoke_permission(&db, user.id, "can_disable_mailings").unwrap();
        assert_eq!(
            permissions_for(&db, user.id).unwrap(),
            vec!["can_view_all_mailings"]
        );
    }

    #[test]
    fn test_set_active() {
        let db = test_db();
        let user = insert(&db, "b@example.com", false, Utc::now()).unwrap();
        set_active(&db, user.id, false).unwrap();
        assert!(!find_by_id(&db, user.id).unwrap().unwrap().is_active);

        assert!(matches!(
            set_active(&db, 999, false),
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
