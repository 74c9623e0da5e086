//! Bundle persistence.
//!
//! Membership lives in `bundle_members` keyed by `(bundle_id, reminder_id)`
//! so appends are idempotent. Every write that changes membership or
//! delivery state is guarded by `delivered = 0`.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::database::{fmt_ts, parse_opt_ts, parse_ts};
use super::Database;
use crate::bundle::{BundleFormat, ReminderBundle};
use crate::error::Result;

struct BundleRow {
    id: String,
    user_id: String,
    bundle_time: String,
    delivery_format: String,
    delivered: bool,
    delivered_at: Option<String>,
    created_at: String,
}

const BUNDLE_COLUMNS: &str =
    "id, user_id, bundle_time, delivery_format, delivered, delivered_at, created_at";

impl Database {
    /// Insert a bundle and its members.
    pub fn insert_bundle(&self, bundle: &ReminderBundle) -> Result<()> {
        self.conn().execute(
            "INSERT INTO bundles (id, user_id, bundle_time, delivery_format, delivered, delivered_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                bundle.id,
                bundle.user_id,
                fmt_ts(bundle.bundle_time),
                bundle.delivery_format.as_str(),
                bundle.delivered,
                bundle.delivered_at.map(fmt_ts),
                fmt_ts(bundle.created_at),
            ],
        )?;
        for (position, reminder_id) in bundle.reminder_ids.iter().enumerate() {
            self.conn().execute(
                "INSERT OR IGNORE INTO bundle_members (bundle_id, reminder_id, position)
                 VALUES (?1, ?2, ?3)",
                params![bundle.id, reminder_id, position as i64],
            )?;
        }
        Ok(())
    }

    pub fn get_bundle(&self, id: &str) -> Result<Option<ReminderBundle>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {BUNDLE_COLUMNS} FROM bundles WHERE id = ?1"),
                params![id],
                Self::bundle_row,
            )
            .optional()?;
        row.map(|r| self.decode_bundle(r)).transpose()
    }

    /// Earliest undelivered bundle of a user whose `bundle_time` lies in `[from, to]`.
    pub fn open_bundle_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<ReminderBundle>> {
        let row = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {BUNDLE_COLUMNS} FROM bundles
                     WHERE user_id = ?1 AND delivered = 0 AND bundle_time >= ?2 AND bundle_time <= ?3
                     ORDER BY bundle_time ASC, created_at ASC LIMIT 1"
                ),
                params![user_id, fmt_ts(from), fmt_ts(to)],
                Self::bundle_row,
            )
            .optional()?;
        row.map(|r| self.decode_bundle(r)).transpose()
    }

    /// The undelivered bundle that already holds `reminder_id`, if any.
    pub fn open_bundle_for_reminder(&self, reminder_id: &str) -> Result<Option<ReminderBundle>> {
        let row = self
            .conn()
            .query_row(
                "SELECT b.id, b.user_id, b.bundle_time, b.delivery_format, b.delivered, b.delivered_at, b.created_at
                 FROM bundles b JOIN bundle_members m ON m.bundle_id = b.id
                 WHERE m.reminder_id = ?1 AND b.delivered = 0
                 ORDER BY b.created_at ASC LIMIT 1",
                params![reminder_id],
                Self::bundle_row,
            )
            .optional()?;
        row.map(|r| self.decode_bundle(r)).transpose()
    }

    /// Append a reminder to an undelivered bundle. Returns `false` if the
    /// bundle was delivered meanwhile or already holds the id.
    pub fn append_to_bundle(&self, bundle_id: &str, reminder_id: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "INSERT OR IGNORE INTO bundle_members (bundle_id, reminder_id, position)
             SELECT ?1, ?2, COALESCE((SELECT MAX(position) + 1 FROM bundle_members WHERE bundle_id = ?1), 0)
             WHERE EXISTS (SELECT 1 FROM bundles WHERE id = ?1 AND delivered = 0)",
            params![bundle_id, reminder_id],
        )?;
        Ok(changed == 1)
    }

    /// Flip `delivered` 0 → 1. Returns whether this caller won.
    pub fn mark_bundle_delivered(&self, bundle_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE bundles SET delivered = 1, delivered_at = ?1 WHERE id = ?2 AND delivered = 0",
            params![fmt_ts(now), bundle_id],
        )?;
        Ok(changed == 1)
    }

    /// Mark every active member of a bundle sent. Returns the ids moved.
    pub fn mark_bundle_members_sent(&self, bundle_id: &str, now: DateTime<Utc>) -> Result<Vec<String>> {
        let ids = self.bundle_member_ids(bundle_id)?;
        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            if self.mark_reminder_sent(&id, now)? {
                moved.push(id);
            }
        }
        Ok(moved)
    }

    pub fn bundle_member_ids(&self, bundle_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT reminder_id FROM bundle_members WHERE bundle_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![bundle_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn bundle_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BundleRow> {
        Ok(BundleRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            bundle_time: row.get(2)?,
            delivery_format: row.get(3)?,
            delivered: row.get(4)?,
            delivered_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn decode_bundle(&self, row: BundleRow) -> Result<ReminderBundle> {
        Ok(ReminderBundle {
            reminder_ids: self.bundle_member_ids(&row.id)?,
            bundle_time: parse_ts("bundle_time", &row.bundle_time)?,
            delivery_format: row
                .delivery_format
                .parse::<BundleFormat>()
                .unwrap_or_default(),
            delivered: row.delivered,
            delivered_at: parse_opt_ts("delivered_at", row.delivered_at)?,
            created_at: parse_ts("created_at", &row.created_at)?,
            id: row.id,
            user_id: row.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, 10, m, 0).unwrap()
    }

    fn bundle(ids: &[&str]) -> ReminderBundle {
        ReminderBundle::new(
            "u1",
            at(0),
            ids.iter().map(|s| s.to_string()).collect(),
            BundleFormat::Summary,
            at(0),
        )
    }

    #[test]
    fn append_is_idempotent_and_ordered() {
        let db = Database::open_memory().unwrap();
        let b = bundle(&["r1", "r2"]);
        db.insert_bundle(&b).unwrap();

        assert!(db.append_to_bundle(&b.id, "r3").unwrap());
        assert!(!db.append_to_bundle(&b.id, "r3").unwrap());
        assert!(!db.append_to_bundle(&b.id, "r1").unwrap());

        let loaded = db.get_bundle(&b.id).unwrap().unwrap();
        assert_eq!(loaded.reminder_ids, ["r1", "r2", "r3"]);
        assert_eq!(loaded.delivery_format, BundleFormat::Summary);
    }

    #[test]
    fn delivered_bundle_is_frozen() {
        let db = Database::open_memory().unwrap();
        let b = bundle(&["r1", "r2"]);
        db.insert_bundle(&b).unwrap();

        assert!(db.mark_bundle_delivered(&b.id, at(1)).unwrap());
        assert!(!db.mark_bundle_delivered(&b.id, at(2)).unwrap());
        assert!(!db.append_to_bundle(&b.id, "r3").unwrap());
        assert_eq!(db.bundle_member_ids(&b.id).unwrap().len(), 2);
        assert!(db.open_bundle_between("u1", at(0), at(5)).unwrap().is_none());
    }

    #[test]
    fn open_bundle_lookup() {
        let db = Database::open_memory().unwrap();
        let b = bundle(&["r1"]);
        db.insert_bundle(&b).unwrap();
        assert_eq!(
            db.open_bundle_between("u1", at(0), at(5)).unwrap().map(|b| b.id),
            Some(b.id.clone())
        );
        assert!(db.open_bundle_between("u1", at(6), at(9)).unwrap().is_none());
        assert_eq!(db.open_bundle_for_reminder("r1").unwrap().map(|b| b.id), Some(b.id));
        assert!(db.open_bundle_for_reminder("r9").unwrap().is_none());
    }
}
