//! Scheduled job repository: persisted job registrations and the
//! execution log written by the scheduler on every tick.
//!
//! Only the schedule itself lives here. Mailing state is always derived
//! from the mailing rows and the current time.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_ts, get_ts, Database, DatabaseError};

/// A registered recurring job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub id: String,
    pub interval_secs: u64,
    pub next_run_time: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let next_run_time: Option<String> = row.get("next_run_time")?;
        let next_run_time = match next_run_time {
            Some(_) => Some(get_ts(row, "next_run_time")?),
            None => None,
        };
        Ok(Self {
            id: row.get("id")?,
            interval_secs: row.get("interval_secs")?,
            next_run_time,
            registered_at: get_ts(row, "registered_at")?,
        })
    }
}

/// Outcome stored for one execution of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Success,
    Error,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Skipped => "skipped",
        }
    }
}

/// One row of the execution log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRow {
    pub id: i64,
    pub job_id: String,
    pub run_time: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: String,
    pub error: Option<String>,
}

/// Registers a job, replacing any existing registration with the same id.
pub fn register(
    db: &Database,
    id: &str,
    interval_secs: u64,
    next_run_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<JobRow, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO scheduled_jobs (id, interval_secs, next_run_time, registered_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
               interval_secs = excluded.interval_secs,
               next_run_time = excluded.next_run_time,
               registered_at = excluded.registered_at",
            params![
                id,
                interval_secs as i64,
                next_run_time.as_ref().map(format_ts),
                format_ts(&now)
            ],
        )?;
        Ok(JobRow {
            id: id.to_string(),
            interval_secs,
            next_run_time,
            registered_at: now,
        })
    })
}

/// Registers the job only if no registration with this id exists yet.
/// Returns whether a row was inserted.
pub fn register_if_missing(
    db: &Database,
    id: &str,
    interval_secs: u64,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT INTO scheduled_jobs (id, interval_secs, next_run_time, registered_at)
             VALUES (?1, ?2, NULL, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![id, interval_secs as i64, format_ts(&now)],
        )?;
        Ok(inserted > 0)
    })
}

pub fn find(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM scheduled_jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?)
    })
}

pub fn set_next_run_time(
    db: &Database,
    id: &str,
    next_run_time: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE scheduled_jobs SET next_run_time = ?2 WHERE id = ?1",
            params![id, format_ts(&next_run_time)],
        )?;
        Ok(())
    })
}

/// Marks the job as no longer scheduled, keeping its history.
pub fn clear_next_run_time(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE scheduled_jobs SET next_run_time = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    })
}

/// Removes a job registration and its execution history.
pub fn unregister(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM scheduled_jobs WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

/// Opens an execution log entry and returns its id.
pub fn start_execution(
    db: &Database,
    job_id: &str,
    run_time: DateTime<Utc>,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_executions (job_id, run_time, status) VALUES (?1, ?2, ?3)",
            params![job_id, format_ts(&run_time), ExecutionStatus::Running.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Closes an execution log entry.
pub fn finish_execution(
    db: &Database,
    execution_id: i64,
    status: ExecutionStatus,
    error: Option<&str>,
    finished_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE job_executions SET status = ?2, error = ?3, finished_at = ?4 WHERE id = ?1",
            params![execution_id, status.as_str(), error, format_ts(&finished_at)],
        )?;
        Ok(())
    })
}

/// Records an execution that never ran (overlapping tick).
pub fn record_skipped(
    db: &Database,
    job_id: &str,
    run_time: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_executions (job_id, run_time, finished_at, status)
             VALUES (?1, ?2, ?2, ?3)",
            params![job_id, format_ts(&run_time), ExecutionStatus::Skipped.as_str()],
        )?;
        Ok(())
    })
}

/// Most recent executions of a job, newest first.
pub fn recent_executions(
    db: &Database,
    job_id: &str,
    limit: u64,
) -> Result<Vec<ExecutionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM job_executions WHERE job_id = ?1
             ORDER BY run_time DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![job_id, limit as i64], |row| {
                let finished_at: Option<String> = row.get("finished_at")?;
                Ok(ExecutionRow {
                    id: row.get("id")?,
                    job_id: row.get("job_id")?,
                    run_time: get_ts(row, "run_time")?,
                    finished_at: match finished_at {
                        Some(_) => Some(get_ts(row, "finished_at")?),
                        None => None,
                    },
                    status: row.get("status")?,
                    error: row.get("error")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
