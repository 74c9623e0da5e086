//! Periodic detection sweeps.
//!
//! Sweeps may run concurrently or repeatedly; each detection checks the
//! event log for an earlier identical detection before logging a new one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::{Event, EventPayload, EventSource};
use crate::popup::TriggerEngine;
use crate::storage::{Config, Database, EventQuery, PreferenceStore};
use crate::tz::local_day_bounds;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Reminder ids (overdue) or user ids (inactivity) newly flagged.
    pub flagged: Vec<String>,
    /// Already flagged earlier; left alone.
    pub skipped: usize,
    pub popups_queued: usize,
}

pub struct Sweeps<'a> {
    db: &'a Database,
    prefs: PreferenceStore<'a>,
    trigger: TriggerEngine<'a>,
    overdue_grace: Duration,
    inactivity_days: i64,
}

impl<'a> Sweeps<'a> {
    pub fn new(db: &'a Database, config: &Config) -> Self {
        Self {
            db,
            prefs: PreferenceStore::new(db, config.engine.default_timezone.clone()),
            trigger: TriggerEngine::new(db, config),
            overdue_grace: Duration::minutes(config.engine.overdue_grace_minutes.max(0)),
            inactivity_days: config.engine.inactivity_days.max(1),
        }
    }

    /// Flag active reminders whose scheduled time passed more than the
    /// grace period ago. Each (reminder, scheduled time) is flagged once;
    /// a rescheduled reminder can become overdue again.
    pub fn detect_overdue(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for reminder in self.db.active_reminders_before(now - self.overdue_grace)? {
            let flagged_before = self
                .db
                .query_events(
                    &EventQuery::for_user(&reminder.user_id)
                        .event_type("reminder_overdue")
                        .reminder(&reminder.id),
                )?
                .iter()
                .any(|e| {
                    matches!(e.payload, EventPayload::ReminderOverdue { scheduled_time, .. }
                        if scheduled_time == reminder.scheduled_time)
                });
            if flagged_before {
                report.skipped += 1;
                continue;
            }

            let event = Event::new(
                &reminder.user_id,
                EventPayload::ReminderOverdue {
                    reminder_id: reminder.id.clone(),
                    scheduled_time: reminder.scheduled_time,
                },
                EventSource::Sweep,
                now,
            )
            .with_contact(reminder.contact_id.clone());
            report.popups_queued += self.trigger.ingest(&event)?.popups.len();
            report.flagged.push(reminder.id);
        }
        if !report.flagged.is_empty() {
            tracing::info!(flagged = report.flagged.len(), "overdue reminders detected");
        }
        Ok(report)
    }

    /// Emit `inactivity_detected` for users with no activity for
    /// `inactivity_days`, at most once per user per local day.
    pub fn detect_inactivity(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for user_id in self.db.known_users()? {
            let Some(last) = self.db.last_activity_at(&user_id)? else {
                continue;
            };
            let idle_days = (now - last).num_days();
            if idle_days < self.inactivity_days {
                continue;
            }

            let prefs = self.prefs.load(&user_id)?;
            let (day_start, day_end) = local_day_bounds(self.prefs.timezone(&prefs), now);
            let already = self.db.event_exists(
                &EventQuery::for_user(&user_id)
                    .event_type("inactivity_detected")
                    .between(day_start, day_end),
            )?;
            if already {
                report.skipped += 1;
                continue;
            }

            tracing::debug!(user_id = %user_id, idle_days, "user inactive");
            let event = Event::new(
                &user_id,
                EventPayload::InactivityDetected {
                    days_inactive: u32::try_from(idle_days).unwrap_or(u32::MAX),
                },
                EventSource::Sweep,
                now,
            );
            report.popups_queued += self.trigger.ingest(&event)?.popups.len();
            report.flagged.push(user_id);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::reminder::{NotificationMethod, Reminder};

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, d, h, m, 0).unwrap()
    }

    #[test]
    fn overdue_is_flagged_once_per_schedule() {
        let db = Database::open_memory().unwrap();
        let r = Reminder::new("u1", "Check in", at(10, 9, 0), NotificationMethod::Push);
        db.insert_reminder(&r).unwrap();
        let sweeps = Sweeps::new(&db, &Config::default());

        // Inside the grace period.
        assert!(sweeps.detect_overdue(at(10, 9, 10)).unwrap().flagged.is_empty());

        let first = sweeps.detect_overdue(at(10, 9, 30)).unwrap();
        assert_eq!(first.flagged, [r.id.clone()]);
        assert_eq!(first.popups_queued, 1);

        let second = sweeps.detect_overdue(at(10, 9, 45)).unwrap();
        assert!(second.flagged.is_empty());
        assert_eq!(second.skipped, 1);

        // A new schedule is a new cycle.
        db.reschedule_reminder(&r.id, at(10, 11, 0), at(10, 10, 0)).unwrap();
        let third = sweeps.detect_overdue(at(10, 12, 0)).unwrap();
        assert_eq!(third.flagged, [r.id.clone()]);
    }

    #[test]
    fn inactivity_once_per_day() {
        let db = Database::open_memory().unwrap();
        db.append_event(&Event::new(
            "u1",
            EventPayload::ReminderCompleted { reminder_id: "r1".into() },
            EventSource::User,
            at(1, 12, 0),
        ))
        .unwrap();
        let sweeps = Sweeps::new(&db, &Config::default());

        assert!(sweeps.detect_inactivity(at(3, 12, 0)).unwrap().flagged.is_empty());

        let first = sweeps.detect_inactivity(at(5, 9, 0)).unwrap();
        assert_eq!(first.flagged, ["u1"]);
        assert_eq!(first.popups_queued, 1);
        assert_eq!(sweeps.detect_inactivity(at(5, 18, 0)).unwrap().skipped, 1);

        // The sweep's own event does not count as activity.
        assert_eq!(sweeps.detect_inactivity(at(6, 9, 0)).unwrap().flagged, ["u1"]);
    }
}
