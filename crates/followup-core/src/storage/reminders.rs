//! Reminder persistence. Only the reads and status transitions the engine
//! needs; full reminder CRUD lives outside this crate.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::database::{fmt_ts, parse_opt_ts, parse_ts};
use super::Database;
use crate::error::Result;
use crate::reminder::{NotificationMethod, Reminder, ReminderStatus};

const REMINDER_COLUMNS: &str = "id, user_id, message, scheduled_time, notification_method, status,
     contact_id, contact_name, sent_at, created_at, updated_at";

/// Raw column values; decoded outside the rusqlite row closure so that
/// decode failures surface as `DatabaseError::Corrupt`.
struct ReminderRow {
    id: String,
    user_id: String,
    message: String,
    scheduled_time: String,
    notification_method: String,
    status: String,
    contact_id: Option<String>,
    contact_name: Option<String>,
    sent_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ReminderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            message: row.get(2)?,
            scheduled_time: row.get(3)?,
            notification_method: row.get(4)?,
            status: row.get(5)?,
            contact_id: row.get(6)?,
            contact_name: row.get(7)?,
            sent_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn decode(self) -> Result<Reminder> {
        Ok(Reminder {
            scheduled_time: parse_ts("scheduled_time", &self.scheduled_time)?,
            notification_method: self
                .notification_method
                .parse::<NotificationMethod>()
                .unwrap_or(NotificationMethod::InApp),
            status: self.status.parse::<ReminderStatus>()?,
            sent_at: parse_opt_ts("sent_at", self.sent_at)?,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            id: self.id,
            user_id: self.user_id,
            message: self.message,
            contact_id: self.contact_id,
            contact_name: self.contact_name,
        })
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl Database {
    pub fn insert_reminder(&self, reminder: &Reminder) -> Result<()> {
        self.conn().execute(
            "INSERT INTO reminders (id, user_id, message, scheduled_time, notification_method, status,
                                    contact_id, contact_name, sent_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                reminder.id,
                reminder.user_id,
                reminder.message,
                fmt_ts(reminder.scheduled_time),
                reminder.notification_method.as_str(),
                reminder.status.as_str(),
                reminder.contact_id,
                reminder.contact_name,
                reminder.sent_at.map(fmt_ts),
                fmt_ts(reminder.created_at),
                fmt_ts(reminder.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_reminder(&self, id: &str) -> Result<Option<Reminder>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
                params![id],
                ReminderRow::from_row,
            )
            .optional()?;
        row.map(ReminderRow::decode).transpose()
    }

    /// Reminders for a user, optionally filtered by status, ordered by time.
    pub fn list_reminders(&self, user_id: &str, status: Option<ReminderStatus>) -> Result<Vec<Reminder>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY scheduled_time ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![user_id, status.map(ReminderStatus::as_str)], ReminderRow::from_row)?;
        rows.map(|r| r?.decode()).collect()
    }

    /// Active (pending or snoozed) reminders of a user scheduled in `[from, to]`.
    pub fn active_reminders_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reminder>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE user_id = ?1 AND status IN ('pending', 'snoozed')
               AND scheduled_time >= ?2 AND scheduled_time <= ?3
             ORDER BY scheduled_time ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![user_id, fmt_ts(from), fmt_ts(to)], ReminderRow::from_row)?;
        rows.map(|r| r?.decode()).collect()
    }

    /// Active reminders (any user) scheduled before `cutoff`.
    pub fn active_reminders_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE status IN ('pending', 'snoozed') AND scheduled_time < ?1
             ORDER BY scheduled_time ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![fmt_ts(cutoff)], ReminderRow::from_row)?;
        rows.map(|r| r?.decode()).collect()
    }

    pub fn get_reminders(&self, ids: &[String]) -> Result<Vec<Reminder>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE id IN ({})",
            placeholders(ids.len())
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), ReminderRow::from_row)?;
        let mut found = rows
            .map(|r| r?.decode())
            .collect::<Result<Vec<_>>>()?;
        // Preserve caller order.
        found.sort_by_key(|r| ids.iter().position(|id| *id == r.id));
        Ok(found)
    }

    /// Move a reminder to `status` only if it is currently in one of `from`.
    /// Returns whether the transition happened.
    pub fn transition_reminder(
        &self,
        id: &str,
        from: &[ReminderStatus],
        status: ReminderStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let stamp = fmt_ts(now);
        let sent_at = (status == ReminderStatus::Sent).then(|| stamp.clone());

        let mut values: Vec<Option<String>> = vec![
            Some(status.as_str().to_string()),
            Some(stamp),
            sent_at,
            Some(id.to_string()),
        ];
        values.extend(from.iter().map(|s| Some(s.as_str().to_string())));

        let sql = format!(
            "UPDATE reminders SET status = ?, updated_at = ?, sent_at = COALESCE(?, sent_at)
             WHERE id = ? AND status IN ({})",
            placeholders(from.len())
        );
        let changed = self
            .conn()
            .execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(changed == 1)
    }

    /// Mark an active reminder sent.
    pub fn mark_reminder_sent(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.transition_reminder(
            id,
            &[ReminderStatus::Pending, ReminderStatus::Snoozed],
            ReminderStatus::Sent,
            now,
        )
    }

    /// Move a reminder to a new time with status `snoozed`.
    pub fn reschedule_reminder(&self, id: &str, until: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE reminders SET scheduled_time = ?1, status = 'snoozed', updated_at = ?2
             WHERE id = ?3 AND status NOT IN ('dismissed')",
            params![fmt_ts(until), fmt_ts(now), id],
        )?;
        Ok(changed == 1)
    }
}
