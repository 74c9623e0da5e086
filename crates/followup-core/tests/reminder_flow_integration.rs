//! Integration tests for the reminder side of the engine: suppression,
//! bundling, delivery and the overdue sweep working against one store.

use std::cell::RefCell;

use chrono::{DateTime, Duration, TimeZone, Utc};
use followup_core::engine::TransportError;
use followup_core::{
    ActionResolver, Bundler, Config, Database, DeliveryTransport, EventQuery, FireOutcome, NotificationEngine,
    NotificationMethod, OutgoingMessage, PreferenceStore, Reminder, ReminderStatus, Scheduler,
    SnoozeReason, SuppressionEngine, SuppressionReason, Sweeps,
};
use rand::SeedableRng;
use rand_pcg::Pcg64;

// 2026-06-10 is a Wednesday.
fn wed(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 10, h, m, 0).unwrap()
}

fn add_reminder(db: &Database, when: DateTime<Utc>) -> Reminder {
    let reminder = Reminder::new("u1", format!("Reminder at {when}"), when, NotificationMethod::Push);
    db.insert_reminder(&reminder).unwrap();
    reminder
}

#[derive(Default)]
struct Outbox {
    sent: RefCell<Vec<OutgoingMessage>>,
}

impl DeliveryTransport for Outbox {
    fn name(&self) -> &str {
        "outbox"
    }

    fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.sent.borrow_mut().push(message.clone());
        Ok(())
    }
}

struct NoopScheduler;

impl Scheduler for NoopScheduler {
    fn schedule(&self, _reminder_id: &str, _at: DateTime<Utc>) -> Result<(), TransportError> {
        Ok(())
    }
}

// ============================================================================
// Bundling
// ============================================================================

#[test]
fn test_close_reminders_share_one_bundle() {
    let db = Database::open_memory().unwrap();
    PreferenceStore::new(&db, "UTC")
        .set_value("u1", "schedule.bundle_window_minutes", "5")
        .unwrap();
    let bundler = Bundler::new(&db, "UTC");

    // Reminders arrive one at a time, each checked as it is created.
    let mut outcomes = Vec::new();
    let mut ids = Vec::new();
    for (h, m) in [(10, 0), (10, 3), (10, 4), (10, 20)] {
        let r = add_reminder(&db, wed(h, m));
        outcomes.push(
            bundler
                .check_and_handle_conflicts("u1", &r.id, r.scheduled_time, wed(9, 0))
                .unwrap(),
        );
        ids.push(r.id);
    }

    assert!(!outcomes[0].should_bundle);
    let bundle_id = outcomes[1].bundle_id.clone().unwrap();
    assert_eq!(outcomes[2].bundle_id.as_deref(), Some(bundle_id.as_str()));
    assert!(!outcomes[3].should_bundle);

    // Firing the first member rechecks it and finds the same bundle.
    let again = bundler
        .check_and_handle_conflicts("u1", &ids[0], wed(10, 0), wed(10, 0))
        .unwrap();
    assert_eq!(again.bundle_id.as_deref(), Some(bundle_id.as_str()));

    let bundle = db.get_bundle(&bundle_id).unwrap().unwrap();
    let mut members = bundle.reminder_ids.clone();
    members.sort();
    let mut expected = ids[..3].to_vec();
    expected.sort();
    assert_eq!(members, expected);
}

#[test]
fn test_bundle_delivery_is_atomic_and_single() {
    let db = Database::open_memory().unwrap();
    let outbox = Outbox::default();
    let engine = NotificationEngine::new(&db, &Config::default(), &outbox, &NoopScheduler);
    let mut rng = Pcg64::seed_from_u64(9);

    let ids: Vec<String> = [0, 3, 4]
        .iter()
        .map(|m| add_reminder(&db, wed(10, *m)).id)
        .collect();

    for id in &ids {
        engine.fire(id, wed(10, 5), &mut rng).unwrap();
    }

    assert_eq!(outbox.sent.borrow().len(), 1);
    let message = &outbox.sent.borrow()[0];
    assert_eq!(message.reminder_ids.len(), 3);
    assert!(message.bundle_id.is_some());
    for id in &ids {
        assert_eq!(db.get_reminder(id).unwrap().unwrap().status, ReminderStatus::Sent);
    }
    assert_eq!(
        db.count_events(&EventQuery::for_user("u1").event_type("bundle_delivered")).unwrap(),
        1
    );
}

#[test]
fn test_bundling_disabled_delivers_independently() {
    let db = Database::open_memory().unwrap();
    PreferenceStore::new(&db, "UTC")
        .set_value("u1", "schedule.bundle_enabled", "false")
        .unwrap();
    let outbox = Outbox::default();
    let engine = NotificationEngine::new(&db, &Config::default(), &outbox, &NoopScheduler);
    let mut rng = Pcg64::seed_from_u64(9);

    let a = add_reminder(&db, wed(10, 0));
    let b = add_reminder(&db, wed(10, 1));
    assert!(matches!(engine.fire(&a.id, wed(10, 0), &mut rng).unwrap(), FireOutcome::Delivered { .. }));
    assert!(matches!(engine.fire(&b.id, wed(10, 1), &mut rng).unwrap(), FireOutcome::Delivered { .. }));
    assert_eq!(outbox.sent.borrow().len(), 2);
}

// ============================================================================
// Daily cap
// ============================================================================

#[test]
fn test_daily_cap_suppresses_regardless_of_time() {
    let db = Database::open_memory().unwrap();
    PreferenceStore::new(&db, "UTC")
        .set_value("u1", "schedule.max_reminders_per_day", "3")
        .unwrap();
    PreferenceStore::new(&db, "UTC")
        .set_value("u1", "schedule.bundle_enabled", "false")
        .unwrap();
    let outbox = Outbox::default();
    let engine = NotificationEngine::new(&db, &Config::default(), &outbox, &NoopScheduler);
    let mut rng = Pcg64::seed_from_u64(4);

    for h in [9, 10, 11] {
        let r = add_reminder(&db, wed(h, 0));
        assert!(matches!(engine.fire(&r.id, wed(h, 0), &mut rng).unwrap(), FireOutcome::Delivered { .. }));
    }

    let suppression = SuppressionEngine::new(&db, &Config::default().engine);
    for (h, m) in [(11, 30), (14, 0), (16, 59)] {
        let r = add_reminder(&db, wed(h, m));
        let d = suppression.evaluate("u1", &r.id, wed(h, m), None, wed(h, m)).unwrap();
        assert_eq!(d.reason, Some(SuppressionReason::DailyCap));
        let next = d.next_attempt_time.unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 6, 11, 9, 0, 0).unwrap());
    }
}

#[test]
fn test_snoozing_a_delivered_reminder_keeps_its_cap_slot() {
    let db = Database::open_memory().unwrap();
    let store = PreferenceStore::new(&db, "UTC");
    store.set_value("u1", "schedule.max_reminders_per_day", "2").unwrap();
    store.set_value("u1", "schedule.bundle_enabled", "false").unwrap();
    let config = Config::default();
    let outbox = Outbox::default();
    let engine = NotificationEngine::new(&db, &config, &outbox, &NoopScheduler);
    let mut rng = Pcg64::seed_from_u64(5);

    let first = add_reminder(&db, wed(10, 0));
    let second = add_reminder(&db, wed(11, 0));
    engine.fire(&first.id, wed(10, 0), &mut rng).unwrap();
    engine.fire(&second.id, wed(11, 0), &mut rng).unwrap();

    // The delivered reminder moves to tomorrow; today's delivery stands.
    let delivered = db.get_reminder(&first.id).unwrap().unwrap();
    ActionResolver::new(&db, &config)
        .snooze(&delivered, wed(10, 0) + Duration::days(1), SnoozeReason::UserAction, wed(11, 30))
        .unwrap()
        .unwrap();

    let third = add_reminder(&db, wed(12, 0));
    let outcome = engine.fire(&third.id, wed(12, 0), &mut rng).unwrap();
    assert!(
        matches!(outcome, FireOutcome::Suppressed { reason: SuppressionReason::DailyCap, .. }),
        "{outcome:?}"
    );
    assert_eq!(outbox.sent.borrow().len(), 2);
}

#[test]
fn test_completing_an_undelivered_reminder_uses_no_cap() {
    let db = Database::open_memory().unwrap();
    let store = PreferenceStore::new(&db, "UTC");
    store.set_value("u1", "schedule.max_reminders_per_day", "1").unwrap();
    store.set_value("u1", "schedule.bundle_enabled", "false").unwrap();
    let config = Config::default();
    let outbox = Outbox::default();
    let engine = NotificationEngine::new(&db, &config, &outbox, &NoopScheduler);
    let mut rng = Pcg64::seed_from_u64(6);

    let done_early = add_reminder(&db, wed(15, 0));
    ActionResolver::new(&db, &config).complete(&done_early, wed(9, 30)).unwrap();

    let due = add_reminder(&db, wed(10, 0));
    assert!(matches!(
        engine.fire(&due.id, wed(10, 0), &mut rng).unwrap(),
        FireOutcome::Delivered { .. }
    ));
}

// ============================================================================
// Overdue sweep
// ============================================================================

#[test]
fn test_overdue_sweep_is_idempotent() {
    let db = Database::open_memory().unwrap();
    let r = add_reminder(&db, wed(9, 0));
    let sweeps = Sweeps::new(&db, &Config::default());

    for minutes in [30, 31, 45, 90] {
        sweeps.detect_overdue(wed(9, 0) + Duration::minutes(minutes)).unwrap();
    }

    let logged = db
        .count_events(&EventQuery::for_user("u1").event_type("reminder_overdue").reminder(&r.id))
        .unwrap();
    assert_eq!(logged, 1);
    assert_eq!(db.list_popups("u1", None).unwrap().len(), 1);
}
