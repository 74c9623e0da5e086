//! Completion streaks.
//!
//! A streak is the number of consecutive local days, ending today, on which
//! the user completed at least one reminder. Reaching a milestone emits
//! `streak_achieved` through the trigger pipeline, at most once per
//! milestone per local day.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::error::Result;
use crate::events::{Event, EventPayload, EventSource};
use crate::popup::{Ingested, TriggerEngine};
use crate::storage::{Config, Database, EventQuery, PreferenceStore};
use crate::tz::local_day_bounds;

pub const MILESTONES: &[u32] = &[3, 7, 14, 30, 60, 100];

/// How far back completions are scanned.
const LOOKBACK_DAYS: i64 = 400;

pub struct StreakTracker<'a> {
    db: &'a Database,
    prefs: PreferenceStore<'a>,
    trigger: TriggerEngine<'a>,
}

impl<'a> StreakTracker<'a> {
    pub fn new(db: &'a Database, config: &Config) -> Self {
        Self {
            db,
            prefs: PreferenceStore::new(db, config.engine.default_timezone.clone()),
            trigger: TriggerEngine::new(db, config),
        }
    }

    /// Current streak length in days as of `now`.
    pub fn current(&self, user_id: &str, now: DateTime<Utc>) -> Result<u32> {
        let tz = self.user_tz(user_id)?;
        let events = self.db.query_events(
            &EventQuery::for_user(user_id)
                .event_type("reminder_completed")
                .between(now - Duration::days(LOOKBACK_DAYS), now + Duration::seconds(1)),
        )?;
        let days: BTreeSet<NaiveDate> = events
            .iter()
            .map(|e| e.created_at.with_timezone(&tz).date_naive())
            .collect();
        Ok(count_back(&days, now.with_timezone(&tz).date_naive()))
    }

    /// Recompute the streak after a completion and emit `streak_achieved`
    /// when a milestone is reached for the first time today.
    pub fn on_completion(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<Ingested>> {
        let streak = self.current(user_id, now)?;
        if !MILESTONES.contains(&streak) {
            return Ok(None);
        }

        let (day_start, day_end) = local_day_bounds(self.user_tz(user_id)?, now);
        let already = self
            .db
            .query_events(
                &EventQuery::for_user(user_id)
                    .event_type("streak_achieved")
                    .between(day_start, day_end),
            )?
            .iter()
            .any(|e| matches!(e.payload, EventPayload::StreakAchieved { streak_days } if streak_days == streak));
        if already {
            return Ok(None);
        }

        tracing::info!(user_id, streak_days = streak, "streak milestone reached");
        let event = Event::new(
            user_id,
            EventPayload::StreakAchieved { streak_days: streak },
            EventSource::System,
            now,
        );
        self.trigger.ingest(&event).map(Some)
    }

    fn user_tz(&self, user_id: &str) -> Result<Tz> {
        let prefs = self.prefs.load(user_id)?;
        Ok(self.prefs.timezone(&prefs))
    }
}

/// Consecutive days in `days` ending at `today`.
fn count_back(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = today;
    while days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, d, h, 0, 0).unwrap()
    }

    fn complete(db: &Database, at: DateTime<Utc>) {
        db.append_event(&Event::new(
            "u1",
            EventPayload::ReminderCompleted { reminder_id: format!("r-{at}") },
            EventSource::User,
            at,
        ))
        .unwrap();
    }

    #[test]
    fn counts_consecutive_days_only() {
        let db = Database::open_memory().unwrap();
        let tracker = StreakTracker::new(&db, &Config::default());
        for d in [3, 5, 6, 7] {
            complete(&db, day(d, 10));
        }
        assert_eq!(tracker.current("u1", day(7, 12)).unwrap(), 3);
        // Nothing yet today: the streak is broken.
        assert_eq!(tracker.current("u1", day(8, 12)).unwrap(), 0);
    }

    #[test]
    fn milestone_fires_once_per_day() {
        let db = Database::open_memory().unwrap();
        let tracker = StreakTracker::new(&db, &Config::default());
        complete(&db, day(8, 9));
        complete(&db, day(9, 9));
        assert!(tracker.on_completion("u1", day(9, 9)).unwrap().is_none());

        complete(&db, day(10, 9));
        let first = tracker.on_completion("u1", day(10, 9)).unwrap().unwrap();
        assert_eq!(first.popups.len(), 1);
        assert_eq!(first.popups[0].template_type, "streak");

        complete(&db, day(10, 15));
        assert!(tracker.on_completion("u1", day(10, 15)).unwrap().is_none());
        assert_eq!(
            db.count_events(&EventQuery::for_user("u1").event_type("streak_achieved")).unwrap(),
            1
        );
    }

    #[test]
    fn local_days_follow_user_timezone() {
        let db = Database::open_memory().unwrap();
        PreferenceStore::new(&db, "UTC")
            .set_value("u1", "timezone", "America/New_York")
            .unwrap();
        let tracker = StreakTracker::new(&db, &Config::default());
        // 02:00 UTC on the 10th is still the 9th in New York.
        complete(&db, day(10, 2));
        complete(&db, day(10, 14));
        assert_eq!(tracker.current("u1", day(10, 15)).unwrap(), 2);
    }
}
