//! Domain types shared by the store, the dispatcher and the CLI.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a mailing. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailingStatus {
    Created,
    Running,
    Completed,
}

impl MailingStatus {
    /// Stable code stored in the `mailings.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MailingStatus::Created => "created",
            MailingStatus::Running => "running",
            MailingStatus::Completed => "completed",
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(self, next: MailingStatus) -> bool {
        matches!(
            (self, next),
            (MailingStatus::Created, MailingStatus::Running)
                | (MailingStatus::Running, MailingStatus::Completed)
        ) || self == next
    }
}

impl fmt::Display for MailingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(MailingStatus::Created),
            "running" => Ok(MailingStatus::Running),
            "completed" => Ok(MailingStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Outcome of one transmission to one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Failure,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AttemptStatus::Success),
            "failure" => Ok(AttemptStatus::Failure),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("first send time {first_send_time} must be before end time {end_time}")]
pub struct InvalidWindow {
    pub first_send_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// The interval during which a mailing may be sent by the scheduler.
///
/// Half-open: `[first_send_time, end_time)`. Batch selection and the
/// dispatcher's own re-check both go through [`Window::contains`], so a
/// mailing is never selected and then declined for the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub first_send_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Window {
    /// Both bounds are truncated to microseconds, the precision they are
    /// stored at, before they are compared.
    pub fn new(
        first_send_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Self, InvalidWindow> {
        let first_send_time = first_send_time.trunc_subsecs(6);
        let end_time = end_time.trunc_subsecs(6);
        if first_send_time >= end_time {
            return Err(InvalidWindow {
                first_send_time,
                end_time,
            });
        }
        Ok(Self {
            first_send_time,
            end_time,
        })
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.first_send_time <= now && now < self.end_time
    }

    /// True once `end_time` has been reached.
    pub fn has_closed(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_superuser: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub comment: Option<String>,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewRecipient {
    pub email: String,
    pub full_name: String,
    pub comment: Option<String>,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i64,
    pub subject: String,
    pub body: String,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub subject: String,
    pub body: String,
    pub owner_id: Option<i64>,
}

/// A scheduled campaign: one message, a recipient set, a window, a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mailing {
    pub id: i64,
    pub first_send_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: MailingStatus,
    pub message_id: i64,
    pub owner_id: Option<i64>,
}

impl Mailing {
    pub fn window(&self) -> Window {
        Window {
            first_send_time: self.first_send_time,
            end_time: self.end_time,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewMailing {
    pub window: Window,
    pub message_id: i64,
    pub owner_id: Option<i64>,
    pub recipient_ids: Vec<i64>,
}

/// Immutable record of one transmission outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailingAttempt {
    pub id: i64,
    pub attempt_time: DateTime<Utc>,
    pub status: AttemptStatus,
    pub server_response: Option<String>,
    pub mailing_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_status_codes() {
        for status in [
            MailingStatus::Created,
            MailingStatus::Running,
            MailingStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<MailingStatus>().unwrap(), status);
        }
        assert!("paused".parse::<MailingStatus>().is_err());
        assert_eq!(AttemptStatus::Failure.to_string(), "failure");
    }

    #[test]
    fn test_status_is_monotonic() {
        use MailingStatus::*;
        assert!(Created.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Running));
        assert!(!Running.can_transition_to(Created));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Created.can_transition_to(Completed));
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        assert!(Window::new(t0(), t0()).is_err());
        assert!(Window::new(t0() + Duration::hours(1), t0()).is_err());
        assert!(Window::new(t0(), t0() + Duration::seconds(1)).is_ok());
    }

    #[test]
    fn test_window_bounds_are_microsecond_precision() {
        let err = Window::new(t0(), t0() + Duration::nanoseconds(500)).unwrap_err();
        assert_eq!(err.end_time, t0());

        let w = Window::new(
            t0() + Duration::nanoseconds(1_700),
            t0() + Duration::nanoseconds(2_900),
        )
        .unwrap();
        assert_eq!(w.first_send_time, t0() + Duration::microseconds(1));
        assert_eq!(w.end_time, t0() + Duration::microseconds(2));
    }

    #[test]
    fn test_window_is_half_open() {
        let w = Window::new(t0(), t0() + Duration::hours(1)).unwrap();
        assert!(!w.contains(t0() - Duration::seconds(1)));
        assert!(w.contains(t0()));
        assert!(w.contains(t0() + Duration::minutes(59)));
        assert!(!w.contains(t0() + Duration::hours(1)));
        assert!(w.has_closed(t0() + Duration::hours(1)));
        assert!(!w.has_closed(t0() + Duration::minutes(10)));
    }
}
