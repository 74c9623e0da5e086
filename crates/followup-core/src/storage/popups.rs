//! Popup persistence.
//!
//! State transitions are single conditional updates that match on the
//! prior state; callers learn from the affected row count whether their
//! transition won.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::database::{fmt_ts, parse_opt_ts, parse_ts};
use super::Database;
use crate::error::Result;
use crate::popup::{ActionKind, Popup, PopupStatus};

const POPUP_COLUMNS: &str = "id, user_id, reminder_id, rule_key, template_type, title, message,
     affirmation, payload, priority, status, queued_at, displayed_at, closed_at, snooze_until,
     expires_at, action_taken";

/// Eligibility, mirrored from `Popup::is_eligible`. Binds `?1` = user, `?2` = now.
const ELIGIBLE: &str = "user_id = ?1
     AND ((status = 'queued' AND (snooze_until IS NULL OR snooze_until <= ?2))
          OR (status = 'displayed' AND snooze_until IS NOT NULL AND snooze_until <= ?2))
     AND (expires_at IS NULL OR expires_at > ?2)";

struct PopupRow {
    id: String,
    user_id: String,
    reminder_id: Option<String>,
    rule_key: String,
    template_type: String,
    title: String,
    message: String,
    affirmation: Option<String>,
    payload: String,
    priority: i64,
    status: String,
    queued_at: String,
    displayed_at: Option<String>,
    closed_at: Option<String>,
    snooze_until: Option<String>,
    expires_at: Option<String>,
    action_taken: Option<String>,
}

impl PopupRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            reminder_id: row.get(2)?,
            rule_key: row.get(3)?,
            template_type: row.get(4)?,
            title: row.get(5)?,
            message: row.get(6)?,
            affirmation: row.get(7)?,
            payload: row.get(8)?,
            priority: row.get(9)?,
            status: row.get(10)?,
            queued_at: row.get(11)?,
            displayed_at: row.get(12)?,
            closed_at: row.get(13)?,
            snooze_until: row.get(14)?,
            expires_at: row.get(15)?,
            action_taken: row.get(16)?,
        })
    }

    fn decode(self) -> Result<Popup> {
        Ok(Popup {
            payload: serde_json::from_str(&self.payload)?,
            priority: crate::popup::clamp_priority(self.priority),
            status: self.status.parse::<PopupStatus>()?,
            queued_at: parse_ts("queued_at", &self.queued_at)?,
            displayed_at: parse_opt_ts("displayed_at", self.displayed_at)?,
            closed_at: parse_opt_ts("closed_at", self.closed_at)?,
            snooze_until: parse_opt_ts("snooze_until", self.snooze_until)?,
            expires_at: parse_opt_ts("expires_at", self.expires_at)?,
            action_taken: self
                .action_taken
                .map(|a| a.parse::<ActionKind>())
                .transpose()?,
            id: self.id,
            user_id: self.user_id,
            reminder_id: self.reminder_id,
            rule_key: self.rule_key,
            template_type: self.template_type,
            title: self.title,
            message: self.message,
            affirmation: self.affirmation,
        })
    }
}

impl Database {
    pub fn insert_popup(&self, popup: &Popup) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO popups ({POPUP_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            params![
                popup.id,
                popup.user_id,
                popup.reminder_id,
                popup.rule_key,
                popup.template_type,
                popup.title,
                popup.message,
                popup.affirmation,
                serde_json::to_string(&popup.payload)?,
                popup.priority,
                popup.status.as_str(),
                fmt_ts(popup.queued_at),
                popup.displayed_at.map(fmt_ts),
                popup.closed_at.map(fmt_ts),
                popup.snooze_until.map(fmt_ts),
                popup.expires_at.map(fmt_ts),
                popup.action_taken.map(ActionKind::as_str),
            ],
        )?;
        Ok(())
    }

    pub fn get_popup(&self, id: &str) -> Result<Option<Popup>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {POPUP_COLUMNS} FROM popups WHERE id = ?1"),
                params![id],
                PopupRow::from_row,
            )
            .optional()?;
        row.map(PopupRow::decode).transpose()
    }

    pub fn list_popups(&self, user_id: &str, status: Option<PopupStatus>) -> Result<Vec<Popup>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {POPUP_COLUMNS} FROM popups
             WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY queued_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![user_id, status.map(PopupStatus::as_str)], PopupRow::from_row)?;
        rows.map(|r| r?.decode()).collect()
    }

    /// Mark queued popups past their TTL as expired. Returns how many moved.
    pub fn expire_popups(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let changed = self.conn().execute(
            "UPDATE popups SET status = 'expired', closed_at = ?2
             WHERE user_id = ?1 AND status = 'queued'
               AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![user_id, fmt_ts(now)],
        )?;
        Ok(changed)
    }

    /// Eligible popups, best first: priority high to low, then FIFO.
    pub fn eligible_popups(&self, user_id: &str, now: DateTime<Utc>, limit: u32) -> Result<Vec<Popup>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {POPUP_COLUMNS} FROM popups WHERE {ELIGIBLE}
             ORDER BY priority DESC, queued_at ASC, id ASC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![user_id, fmt_ts(now), limit], PopupRow::from_row)?;
        rows.map(|r| r?.decode()).collect()
    }

    /// Compare-and-set to `displayed`, matching the status and snooze the
    /// caller observed. Clears `snooze_until`.
    pub fn claim_popup(&self, seen: &Popup, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE popups SET status = 'displayed', displayed_at = ?1, snooze_until = NULL
             WHERE id = ?2 AND status = ?3 AND snooze_until IS ?4",
            params![
                fmt_ts(now),
                seen.id,
                seen.status.as_str(),
                seen.snooze_until.map(fmt_ts),
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn set_popup_affirmation(&self, id: &str, text: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE popups SET affirmation = ?1 WHERE id = ?2",
            params![text, id],
        )?;
        Ok(())
    }

    /// Give an open popup a `snooze_until`; its status is unchanged.
    pub fn snooze_popup(&self, id: &str, until: DateTime<Utc>, action: Option<ActionKind>) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE popups SET snooze_until = ?1, action_taken = COALESCE(?2, action_taken)
             WHERE id = ?3 AND status IN ('queued', 'displayed')",
            params![fmt_ts(until), action.map(ActionKind::as_str), id],
        )?;
        Ok(changed == 1)
    }

    /// Close an open popup as acted.
    pub fn close_popup(&self, id: &str, action: ActionKind, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE popups SET status = 'acted', action_taken = ?1, closed_at = ?2
             WHERE id = ?3 AND status IN ('queued', 'displayed')",
            params![action.as_str(), fmt_ts(now), id],
        )?;
        Ok(changed == 1)
    }
}
