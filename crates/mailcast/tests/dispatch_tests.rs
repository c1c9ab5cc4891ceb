//! Delivery behavior of a single mailing on both entry points.

mod common;

use chrono::Duration;

use common::TestHarness;
use mailcast::db::mailing_repo;
use mailcast::dispatch::SUCCESS_RESPONSE;
use mailcast::model::{AttemptStatus, MailingStatus};

#[test]
fn test_successful_send_inside_window() {
    let h = TestHarness::new();
    let mailing = h.mailing().recipients(&["ann@example.org"]).create();
    h.advance(Duration::minutes(10));

    let report = h.dispatcher.send_mailing(&mailing, h.now()).unwrap().unwrap();
    assert_eq!(report.succeeded, 1);

    let attempts = h.attempts(mailing.id);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Success);
    assert_eq!(attempts[0].server_response.as_deref(), Some(SUCCESS_RESPONSE));
    assert_eq!(attempts[0].attempt_time, h.now());
    assert_eq!(h.status(mailing.id), MailingStatus::Running);

    let sent = h.mailer.sent();
    assert_eq!(sent[0].to, "ann@example.org");
    assert_eq!(sent[0].from, common::harness::FROM_ADDRESS);
    assert_eq!(sent[0].subject, "Spring sale");
}

#[test]
fn test_transmission_error_still_advances_status() {
    let h = TestHarness::new();
    let mailing = h.mailing().recipients(&["ann@example.org"]).create();
    h.mailer.fail_for("ann@example.org", "SMTP timeout");
    h.advance(Duration::minutes(10));

    h.dispatcher.send_mailing(&mailing, h.now()).unwrap();

    let attempts = h.attempts(mailing.id);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Failure);
    assert_eq!(attempts[0].server_response.as_deref(), Some("SMTP timeout"));
    assert_eq!(h.status(mailing.id), MailingStatus::Running);
}

#[test]
fn test_one_attempt_per_recipient_partitioned_by_outcome() {
    let h = TestHarness::new();
    let emails = [
        "a@example.org",
        "b@example.org",
        "c@example.org",
        "d@example.org",
        "e@example.org",
    ];
    let mailing = h.mailing().recipients(&emails).create();
    h.mailer.fail_for("b@example.org", "550 No such user");
    h.mailer.fail_for("d@example.org", "Connection refused");

    let report = h.dispatcher.send_mailing(&mailing, h.now()).unwrap().unwrap();
    assert_eq!(report.attempted, 5);

    let attempts = h.attempts(mailing.id);
    assert_eq!(attempts.len(), emails.len());
    assert!(attempts.iter().all(|a| a.mailing_id == mailing.id));
    let failures = attempts
        .iter()
        .filter(|a| a.status == AttemptStatus::Failure)
        .count();
    assert_eq!(failures, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.succeeded, 3);
    // Recipients after a failure were still tried.
    assert!(h.mailer.sent_to().contains(&"e@example.org".to_string()));
}

#[test]
fn test_all_recipients_failing_never_completes() {
    let h = TestHarness::new();
    let mailing = h
        .mailing()
        .recipients(&["a@example.org", "b@example.org"])
        .create();
    h.mailer.fail_for("a@example.org", "down");
    h.mailer.fail_for("b@example.org", "down");

    h.dispatcher.send_mailing(&mailing, h.now()).unwrap();
    assert_eq!(h.status(mailing.id), MailingStatus::Running);
}

#[test]
fn test_outside_window_is_a_no_op() {
    let h = TestHarness::new();
    let early = h
        .mailing()
        .window(Duration::hours(1), Duration::hours(2))
        .recipients(&["early@example.org"])
        .create();
    let late = h
        .mailing()
        .window(Duration::hours(-2), Duration::hours(-1))
        .recipients(&["late@example.org"])
        .create();
    let ends_now = h
        .mailing()
        .window(Duration::hours(-1), Duration::zero())
        .recipients(&["edge@example.org"])
        .create();

    for mailing in [&early, &late, &ends_now] {
        assert!(h.dispatcher.send_mailing(mailing, h.now()).unwrap().is_none());
        assert!(h.attempts(mailing.id).is_empty());
        assert_eq!(h.status(mailing.id), MailingStatus::Created);
    }
    assert!(h.mailer.sent().is_empty());
}

#[test]
fn test_repeated_dispatch_keeps_running() {
    let h = TestHarness::new();
    let mailing = h.mailing().recipients(&["a@example.org"]).create();

    h.dispatcher.send_mailing(&mailing, h.now()).unwrap();
    let running = mailing_repo::find_by_id(&h.db, mailing.id).unwrap().unwrap();
    assert_eq!(running.status, MailingStatus::Running);

    for _ in 0..2 {
        h.advance(Duration::minutes(1));
        h.dispatcher.send_mailing(&running, h.now()).unwrap();
        assert_eq!(h.status(mailing.id), MailingStatus::Running);
    }
    assert_eq!(h.attempts(mailing.id).len(), 3);
}

#[test]
fn test_stale_created_copy_does_not_revert_status() {
    let h = TestHarness::new();
    let mailing = h.mailing().recipients(&["a@example.org"]).create();
    h.force_status(mailing.id, MailingStatus::Completed);

    // `mailing` still says Created; the store wins.
    let report = h.dispatcher.execute_send(&mailing).unwrap();
    assert_eq!(report.status, MailingStatus::Completed);
    assert_eq!(h.status(mailing.id), MailingStatus::Completed);
}

#[test]
fn test_manual_send_before_window_opens() {
    let h = TestHarness::new();
    let mailing = h
        .mailing()
        .window(Duration::days(1), Duration::days(2))
        .recipients(&["a@example.org", "b@example.org"])
        .create();

    let report = h.dispatcher.send_now(mailing.id).unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(h.attempts(mailing.id).len(), 2);
    assert_eq!(h.status(mailing.id), MailingStatus::Running);
}

#[test]
fn test_empty_recipient_set() {
    let h = TestHarness::new();
    let mailing = h.mailing().create();

    let report = h.dispatcher.send_mailing(&mailing, h.now()).unwrap().unwrap();
    assert_eq!(report.attempted, 0);
    assert!(h.attempts(mailing.id).is_empty());
    assert_eq!(h.status(mailing.id), MailingStatus::Running);
}

#[test]
fn test_recipient_set_changes_apply_to_next_dispatch() {
    let h = TestHarness::new();
    let mailing = h
        .mailing()
        .recipients(&["keep@example.org", "drop@example.org"])
        .create();
    let added = h.recipient("new@example.org");
    let dropped = mailing_repo::recipients_of(&h.db, mailing.id)
        .unwrap()
        .into_iter()
        .find(|r| r.email == "drop@example.org")
        .unwrap();

    mailing_repo::remove_recipient(&h.db, mailing.id, dropped.id).unwrap();
    mailing_repo::add_recipient(&h.db, mailing.id, added).unwrap();

    h.dispatcher.send_mailing(&mailing, h.now()).unwrap();
    let mut sent = h.mailer.sent_to();
    sent.sort();
    assert_eq!(sent, vec!["keep@example.org", "new@example.org"]);
}

#[test]
fn test_message_edits_apply_to_next_dispatch() {
    let h = TestHarness::new();
    let mailing = h.mailing().recipients(&["a@example.org"]).create();
    let mut message = mailcast::db::message_repo::find_by_id(&h.db, mailing.message_id)
        .unwrap()
        .unwrap();
    message.subject = "Final call".to_string();
    mailcast::db::message_repo::update(&h.db, &message).unwrap();

    h.dispatcher.send_now(mailing.id).unwrap();
    assert_eq!(h.mailer.sent()[0].subject, "Final call");
}

#[test]
fn test_concurrent_dispatchers_do_not_double_send() {
    use std::sync::{Arc, Barrier};

    let barrier = Arc::new(Barrier::new(2));
    let hook_barrier = Arc::clone(&barrier);
    let hook_fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let fired = Arc::clone(&hook_fired);
    // The first send parks until the second dispatcher has tried its claim.
    let mailer = mailcast::MemoryMailer::new().on_send(move |_| {
        if !fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
            hook_barrier.wait();
            hook_barrier.wait();
        }
    });
    let h = TestHarness::with_mailer(mailer);
    let mailing = h.mailing().recipients(&["a@example.org"]).create();

    let scheduled = h.dispatcher.clone();
    let scheduled_mailing = mailing.clone();
    let now = h.now();
    let worker = std::thread::spawn(move || scheduled.send_mailing(&scheduled_mailing, now));

    barrier.wait();
    let manual = h.other_dispatcher().send_now(mailing.id);
    barrier.wait();

    let scheduled = worker.join().unwrap().unwrap();
    assert!(scheduled.is_some());
    assert!(matches!(
        manual,
        Err(mailcast::dispatch::DispatchError::Busy(_))
    ));
    assert_eq!(h.attempts(mailing.id).len(), 1);
}
