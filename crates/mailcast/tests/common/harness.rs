//! Test harness for isolated dispatch runs.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use mailcast::authz::{self, Subject};
use mailcast::db::{attempt_repo, mailing_repo, recipient_repo, user_repo, Database};
use mailcast::model::{MailingAttempt, MailingStatus, NewRecipient, User};
use mailcast::{Dispatcher, ManualClock, MemoryMailer};

use super::builders::MailingBuilder;

/// Fixed starting instant for every harness: `T` in the scenarios.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

pub const FROM_ADDRESS: &str = "campaigns@example.com";

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub db: Database,
    pub mailer: Arc<MemoryMailer>,
    pub clock: Arc<ManualClock>,
    pub dispatcher: Dispatcher,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_mailer(MemoryMailer::new())
    }

    /// Harness whose mailer was configured up front (e.g. with a send hook).
    pub fn with_mailer(mailer: MemoryMailer) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        Self::with_mailer_and_clock(mailer, clock)
    }

    pub fn with_mailer_and_clock(mailer: MemoryMailer, clock: Arc<ManualClock>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("mailcast.db");
        let db = Database::open(&db_path).expect("Failed to open database");
        let mailer = Arc::new(mailer);
        let dispatcher = Dispatcher::new(db.clone(), mailer.clone(), FROM_ADDRESS)
            .with_clock(clock.clone());

        Self {
            temp_dir,
            db_path,
            db,
            mailer,
            clock,
            dispatcher,
        }
    }

    /// A second dispatcher on the same store, as another process would be.
    pub fn other_dispatcher(&self) -> Dispatcher {
        let db = Database::open(&self.db_path).expect("Failed to reopen database");
        Dispatcher::new(db, self.mailer.clone(), FROM_ADDRESS).with_clock(self.clock.clone())
    }

    pub fn now(&self) -> DateTime<Utc> {
        use mailcast::Clock;
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn set_now(&self, to: DateTime<Utc>) {
        self.clock.set(to);
    }

    pub fn user(&self, email: &str) -> User {
        user_repo::insert(&self.db, email, false, t0()).expect("Failed to insert user")
    }

    pub fn superuser(&self, email: &str) -> User {
        user_repo::insert(&self.db, email, true, t0()).expect("Failed to insert user")
    }

    pub fn manager(&self, email: &str) -> User {
        let user = self.user(email);
        authz::grant_manager(&self.db, user.id).expect("Failed to grant manager");
        user
    }

    pub fn subject(&self, user: &User) -> Subject {
        Subject::load(&self.db, user.id)
            .expect("Failed to load subject")
            .expect("User disappeared")
    }

    pub fn recipient(&self, email: &str) -> i64 {
        recipient_repo::insert(
            &self.db,
            &NewRecipient {
                email: email.to_string(),
                full_name: email.split('@').next().unwrap_or_default().to_string(),
                ..Default::default()
            },
        )
        .expect("Failed to insert recipient")
        .id
    }

    pub fn recipients(&self, emails: &[&str]) -> Vec<i64> {
        emails.iter().map(|e| self.recipient(e)).collect()
    }

    pub fn mailing(&self) -> MailingBuilder<'_> {
        MailingBuilder::new(self)
    }

    pub fn attempts(&self, mailing_id: i64) -> Vec<MailingAttempt> {
        attempt_repo::list_for_mailing(&self.db, mailing_id).expect("Failed to list attempts")
    }

    pub fn status(&self, mailing_id: i64) -> MailingStatus {
        mailing_repo::find_by_id(&self.db, mailing_id)
            .expect("Failed to load mailing")
            .expect("Mailing disappeared")
            .status
    }

    /// Forces a status through the forward-only transitions.
    pub fn force_status(&self, mailing_id: i64, to: MailingStatus) {
        let mut current = self.status(mailing_id);
        while current != to {
            let next = match current {
                MailingStatus::Created => MailingStatus::Running,
                MailingStatus::Running => MailingStatus::Completed,
                MailingStatus::Completed => panic!("cannot move a completed mailing to {to}"),
            };
            mailing_repo::transition_status(&self.db, mailing_id, current, next)
                .expect("Failed to transition");
            current = next;
        }
    }
}
