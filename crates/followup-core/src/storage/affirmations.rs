//! Affirmation usage ledger.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::database::{fmt_ts, parse_ts};
use super::Database;
use crate::affirmation::{AffirmationCategory, AffirmationUsage};
use crate::error::Result;

impl Database {
    pub fn insert_affirmation_usage(&self, usage: &AffirmationUsage) -> Result<()> {
        self.conn().execute(
            "INSERT INTO affirmation_usage (user_id, affirmation_id, category, shown_at, popup_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                usage.user_id,
                usage.affirmation_id,
                usage.category.as_str(),
                fmt_ts(usage.shown_at),
                usage.popup_id,
            ],
        )?;
        Ok(())
    }

    /// The user's most recent usages, newest first.
    pub fn recent_affirmations(&self, user_id: &str, limit: u32) -> Result<Vec<AffirmationUsage>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, affirmation_id, category, shown_at, popup_id
             FROM affirmation_usage WHERE user_id = ?1
             ORDER BY shown_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;
        rows.map(|r| {
            let (user_id, affirmation_id, category, shown_at, popup_id) = r?;
            Ok(AffirmationUsage {
                user_id,
                affirmation_id,
                category: category.parse::<AffirmationCategory>()?,
                shown_at: parse_ts("shown_at", &shown_at)?,
                popup_id,
            })
        })
        .collect()
    }

    pub fn count_affirmations_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM affirmation_usage
             WHERE user_id = ?1 AND shown_at >= ?2 AND shown_at < ?3",
            params![user_id, fmt_ts(from), fmt_ts(to)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn last_affirmation_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT MAX(shown_at) FROM affirmation_usage WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        raw.map(|s| parse_ts("shown_at", &s)).transpose()
    }
}
