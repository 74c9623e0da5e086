//! Snooze history and rolling per-bucket patterns.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::database::{fmt_ts, parse_ts};
use super::Database;
use crate::error::Result;
use crate::snooze::{SnoozeHistoryEntry, SnoozeReason};

/// Samples kept per (weekday, bucket).
pub const PATTERN_SAMPLES: usize = 20;

impl Database {
    pub fn insert_snooze(&self, entry: &SnoozeHistoryEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO snooze_history (id, user_id, reminder_id, duration_minutes, reason,
                                         time_of_day, day_of_week, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.user_id,
                entry.reminder_id,
                entry.duration_minutes,
                entry.reason.as_str(),
                entry.time_of_day,
                entry.day_of_week,
                fmt_ts(entry.created_at),
            ],
        )?;
        Ok(())
    }

    /// A user's snoozes created at or after `since`, oldest first.
    pub fn snoozes_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<SnoozeHistoryEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, reminder_id, duration_minutes, reason, time_of_day, day_of_week, created_at
             FROM snooze_history WHERE user_id = ?1 AND created_at >= ?2
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id, fmt_ts(since)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, u8>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;
        rows.map(|r| {
            let (id, user_id, reminder_id, duration_minutes, reason, time_of_day, day_of_week, created_at) = r?;
            Ok(SnoozeHistoryEntry {
                id,
                user_id,
                reminder_id,
                duration_minutes,
                reason: reason.parse::<SnoozeReason>()?,
                time_of_day,
                day_of_week,
                created_at: parse_ts("created_at", &created_at)?,
            })
        })
        .collect()
    }

    /// Push a sample into the (weekday, bucket) pattern, keeping the newest
    /// [`PATTERN_SAMPLES`].
    pub fn fold_snooze_pattern(
        &self,
        user_id: &str,
        day_of_week: u8,
        bucket: u8,
        duration_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut samples = self.snooze_pattern(user_id, day_of_week, bucket)?;
        samples.push(duration_minutes);
        if samples.len() > PATTERN_SAMPLES {
            let excess = samples.len() - PATTERN_SAMPLES;
            samples.drain(..excess);
        }
        self.conn().execute(
            "INSERT INTO snooze_patterns (user_id, day_of_week, bucket, samples, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, day_of_week, bucket)
             DO UPDATE SET samples = excluded.samples, updated_at = excluded.updated_at",
            params![
                user_id,
                day_of_week,
                bucket,
                serde_json::to_string(&samples)?,
                fmt_ts(now)
            ],
        )?;
        Ok(())
    }

    pub fn snooze_pattern(&self, user_id: &str, day_of_week: u8, bucket: u8) -> Result<Vec<i64>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT samples FROM snooze_patterns
                 WHERE user_id = ?1 AND day_of_week = ?2 AND bucket = ?3",
                params![user_id, day_of_week, bucket],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn pattern_keeps_newest_twenty() {
        let db = Database::open_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 6, 10, 14, 0, 0).unwrap();
        for minutes in 1..=25 {
            db.fold_snooze_pattern("u1", 2, 3, minutes, now).unwrap();
        }
        let samples = db.snooze_pattern("u1", 2, 3).unwrap();
        assert_eq!(samples.len(), PATTERN_SAMPLES);
        assert_eq!(samples.first(), Some(&6));
        assert_eq!(samples.last(), Some(&25));
        assert!(db.snooze_pattern("u1", 2, 4).unwrap().is_empty());
    }
}
