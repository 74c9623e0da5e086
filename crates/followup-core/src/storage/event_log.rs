//! Append-only event log.
//!
//! Rows are never updated or deleted. Idempotent writers check for an
//! existing row with the helpers at the bottom of this file before
//! appending.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::database::{fmt_ts, parse_opt_ts, parse_ts};
use super::Database;
use crate::error::Result;
use crate::events::{Event, EventPayload, EventSource};

/// Read-path filter. Every field is optional; unset fields match anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
    pub user_id: Option<String>,
    pub event_type: Option<String>,
    pub reminder_id: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl EventQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn reminder(mut self, reminder_id: impl Into<String>) -> Self {
        self.reminder_id = Some(reminder_id.into());
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn where_clause(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(user) = &self.user_id {
            clauses.push("user_id = ?");
            values.push(user.clone());
        }
        if let Some(kind) = &self.event_type {
            clauses.push("event_type = ?");
            values.push(kind.clone());
        }
        if let Some(reminder) = &self.reminder_id {
            clauses.push("reminder_id = ?");
            values.push(reminder.clone());
        }
        if let Some(since) = self.since {
            clauses.push("created_at >= ?");
            values.push(fmt_ts(since));
        }
        if let Some(until) = self.until {
            clauses.push("created_at < ?");
            values.push(fmt_ts(until));
        }
        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        (sql, values)
    }
}

struct EventRow {
    id: i64,
    user_id: String,
    event_type: String,
    event_data: String,
    contact_id: Option<String>,
    reminder_id: Option<String>,
    source: String,
    created_at: String,
}

impl EventRow {
    fn decode(self) -> Result<Event> {
        let data: serde_json::Value = serde_json::from_str(&self.event_data)?;
        Ok(Event {
            id: self.id,
            user_id: self.user_id,
            payload: EventPayload::parse(&self.event_type, data)?,
            contact_id: self.contact_id,
            reminder_id: self.reminder_id,
            source: EventSource::parse(&self.source),
            created_at: parse_ts("created_at", &self.created_at)?,
        })
    }
}

impl Database {
    /// Append an event and return its row id.
    pub fn append_event(&self, event: &Event) -> Result<i64> {
        let data = serde_json::to_string(&event.payload.data())?;
        self.conn().execute(
            "INSERT INTO events (user_id, event_type, event_data, contact_id, reminder_id, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.user_id,
                event.event_type(),
                data,
                event.contact_id,
                event.reminder_id,
                event.source.as_str(),
                fmt_ts(event.created_at),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Events matching `query`, oldest first.
    pub fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let (filter, values) = query.where_clause();
        let limit = query
            .limit
            .map(|n| format!(" LIMIT {n}"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT id, user_id, event_type, event_data, contact_id, reminder_id, source, created_at
             FROM events {filter} ORDER BY created_at ASC, id ASC{limit}"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok(EventRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                event_type: row.get(2)?,
                event_data: row.get(3)?,
                contact_id: row.get(4)?,
                reminder_id: row.get(5)?,
                source: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        rows.map(|r| r?.decode()).collect()
    }

    pub fn count_events(&self, query: &EventQuery) -> Result<u32> {
        let (filter, values) = query.where_clause();
        let count: u32 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM events {filter}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn event_exists(&self, query: &EventQuery) -> Result<bool> {
        let (filter, values) = query.where_clause();
        let hit: Option<i64> = self
            .conn()
            .query_row(
                &format!("SELECT 1 FROM events {filter} LIMIT 1"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Whether a `reminder_suppressed` event already exists for this
    /// reminder and retry time.
    pub fn suppression_logged(
        &self,
        reminder_id: &str,
        next_attempt_time: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        // Stored through serde, which writes chrono's own RFC 3339 form.
        let next = next_attempt_time.map(|t| {
            serde_json::to_value(t)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        });
        let hit: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM events
                 WHERE event_type = 'reminder_suppressed' AND reminder_id = ?1
                   AND json_extract(event_data, '$.next_attempt_time') IS ?2
                 LIMIT 1",
                params![reminder_id, next],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Delivery instants from `reminder_sent` in `[from, to)`. The log is
    /// the delivery ledger: later snoozes or completions of a reminder do
    /// not change what was already sent.
    pub fn delivery_times_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let mut stmt = self.conn().prepare(
            "SELECT created_at FROM events
             WHERE user_id = ?1 AND event_type = 'reminder_sent'
               AND created_at >= ?2 AND created_at < ?3
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id, fmt_ts(from), fmt_ts(to)], |row| {
            row.get::<_, String>(0)
        })?;
        rows.map(|r| parse_ts("created_at", &r?)).collect()
    }

    pub fn last_delivery_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self.conn().query_row(
            "SELECT MAX(created_at) FROM events
             WHERE user_id = ?1 AND event_type = 'reminder_sent'",
            params![user_id],
            |row| row.get(0),
        )?;
        parse_opt_ts("created_at", raw)
    }

    /// Most recent event for a user that a sweep did not produce.
    pub fn last_activity_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self.conn().query_row(
            "SELECT MAX(created_at) FROM events WHERE user_id = ?1 AND source != 'sweep'",
            params![user_id],
            |row| row.get(0),
        )?;
        parse_opt_ts("created_at", raw)
    }

    /// Every user the engine knows about, from reminders and events.
    pub fn known_users(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM reminders UNION SELECT user_id FROM events ORDER BY 1",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::suppression::SuppressionReason;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, h, 0, 0).unwrap()
    }

    fn completed(user: &str, reminder: &str, h: u32) -> Event {
        Event::new(
            user,
            EventPayload::ReminderCompleted {
                reminder_id: reminder.into(),
            },
            EventSource::User,
            at(h),
        )
    }

    #[test]
    fn append_and_filter() {
        let db = Database::open_memory().unwrap();
        db.append_event(&completed("u1", "r1", 9)).unwrap();
        db.append_event(&completed("u1", "r2", 11)).unwrap();
        db.append_event(&completed("u2", "r3", 10)).unwrap();
        db.append_event(&Event::new(
            "u1",
            EventPayload::StreakAchieved { streak_days: 3 },
            EventSource::System,
            at(12),
        ))
        .unwrap();

        let all_u1 = db.query_events(&EventQuery::for_user("u1")).unwrap();
        assert_eq!(all_u1.len(), 3);

        let completions = db
            .query_events(&EventQuery::for_user("u1").event_type("reminder_completed"))
            .unwrap();
        assert_eq!(completions.len(), 2);
        assert_eq!(completions[0].reminder_id.as_deref(), Some("r1"));

        let windowed = EventQuery::for_user("u1").between(at(10), at(12));
        assert_eq!(db.count_events(&windowed).unwrap(), 1);

        assert_eq!(db.last_activity_at("u1").unwrap(), Some(at(12)));
        db.append_event(&Event::new(
            "u1",
            EventPayload::InactivityDetected { days_inactive: 3 },
            EventSource::Sweep,
            at(13),
        ))
        .unwrap();
        assert_eq!(db.last_activity_at("u1").unwrap(), Some(at(12)));
        assert_eq!(db.known_users().unwrap(), ["u1", "u2"]);
    }

    #[test]
    fn stored_payload_round_trips() {
        let db = Database::open_memory().unwrap();
        let event = Event::new(
            "u1",
            EventPayload::ReminderSuppressed {
                reminder_id: "r1".into(),
                reason: SuppressionReason::QuietHours,
                next_attempt_time: Some(at(8) + Duration::days(1)),
            },
            EventSource::Scheduler,
            at(23),
        );
        db.append_event(&event).unwrap();
        let loaded = db.query_events(&EventQuery::for_user("u1")).unwrap();
        assert_eq!(loaded[0].payload, event.payload);
        assert_eq!(loaded[0].source, EventSource::Scheduler);
    }

    #[test]
    fn suppression_existence_check_matches_retry_time() {
        let db = Database::open_memory().unwrap();
        let next = Some(at(8) + Duration::days(1));
        db.append_event(&Event::new(
            "u1",
            EventPayload::ReminderSuppressed {
                reminder_id: "r1".into(),
                reason: SuppressionReason::QuietHours,
                next_attempt_time: next,
            },
            EventSource::Scheduler,
            at(23),
        ))
        .unwrap();

        assert!(db.suppression_logged("r1", next).unwrap());
        assert!(!db.suppression_logged("r1", Some(at(9) + Duration::days(1))).unwrap());
        assert!(!db.suppression_logged("r1", None).unwrap());
        assert!(!db.suppression_logged("r2", next).unwrap());
    }

    #[test]
    fn delivery_ledger_ignores_other_events() {
        let db = Database::open_memory().unwrap();
        for (h, reminder) in [(9, "r1"), (10, "r2"), (11, "r3")] {
            db.append_event(&Event::new(
                "u1",
                EventPayload::ReminderSent {
                    reminder_id: reminder.into(),
                    bundle_id: None,
                },
                EventSource::Scheduler,
                at(h),
            ))
            .unwrap();
        }
        db.append_event(&Event::new(
            "u1",
            EventPayload::ReminderCompleted { reminder_id: "r9".into() },
            EventSource::User,
            at(12),
        ))
        .unwrap();

        assert_eq!(db.delivery_times_between("u1", at(0), at(23)).unwrap().len(), 3);
        assert_eq!(db.delivery_times_between("u1", at(10), at(11)).unwrap(), [at(10)]);
        assert_eq!(db.last_delivery_at("u1").unwrap(), Some(at(11)));
        assert!(db.last_delivery_at("u2").unwrap().is_none());
    }
}
