//! Preference Store: one row per user.
//!
//! Reads go to the database every time a store is created; the store is
//! meant to live for a single invocation and memoises only within it.
//! Writes are single-row upserts followed by an explicit invalidation.

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::Utc;
use chrono_tz::Tz;
use rusqlite::{params, OptionalExtension};

use super::database::fmt_ts;
use super::json_path::{display_value, get_by_path, set_by_path};
use super::Database;
use crate::error::{ConfigError, Result};
use crate::preferences::UserPreferences;
use crate::tz::resolve_timezone;

pub struct PreferenceStore<'a> {
    db: &'a Database,
    default_timezone: String,
    cache: RefCell<HashMap<String, UserPreferences>>,
}

impl<'a> PreferenceStore<'a> {
    pub fn new(db: &'a Database, default_timezone: impl Into<String>) -> Self {
        Self {
            db,
            default_timezone: default_timezone.into(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Load preferences, falling back to documented defaults when the row
    /// is missing or unreadable.
    pub fn load(&self, user_id: &str) -> Result<UserPreferences> {
        if let Some(hit) = self.cache.borrow().get(user_id) {
            return Ok(hit.clone());
        }

        let raw: Option<String> = self
            .db
            .conn()
            .query_row(
                "SELECT data FROM preferences WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        let prefs = match raw {
            Some(data) => match serde_json::from_str::<UserPreferences>(&data) {
                Ok(mut p) => {
                    p.user_id = user_id.to_string();
                    p
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "unreadable preference row, using defaults");
                    UserPreferences::defaults_for(user_id)
                }
            },
            None => {
                tracing::debug!(user_id, "no preference row, using defaults");
                UserPreferences::defaults_for(user_id)
            }
        };

        self.cache
            .borrow_mut()
            .insert(user_id.to_string(), prefs.clone());
        Ok(prefs)
    }

    /// Upsert the whole row, then drop the memoised copy.
    pub fn save(&self, prefs: &UserPreferences) -> Result<()> {
        let data = serde_json::to_string(prefs)?;
        self.db.conn().execute(
            "INSERT INTO preferences (user_id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![prefs.user_id, data, fmt_ts(Utc::now())],
        )?;
        self.invalidate(&prefs.user_id);
        Ok(())
    }

    pub fn invalidate(&self, user_id: &str) {
        self.cache.borrow_mut().remove(user_id);
    }

    /// The user's timezone, or the configured default.
    pub fn timezone(&self, prefs: &UserPreferences) -> Tz {
        resolve_timezone(prefs.timezone.as_deref(), &self.default_timezone)
    }

    /// Read one preference by dot path, e.g. `schedule.max_reminders_per_day`.
    pub fn get_value(&self, user_id: &str, key: &str) -> Result<Option<String>> {
        let json = serde_json::to_value(self.load(user_id)?)?;
        Ok(get_by_path(&json, key).map(display_value))
    }

    /// Update one preference by dot path and persist.
    pub fn set_value(&self, user_id: &str, key: &str, value: &str) -> Result<UserPreferences> {
        let mut json = serde_json::to_value(self.load(user_id)?)?;
        set_by_path(&mut json, key, value)?;
        let prefs: UserPreferences =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        self.save(&prefs)?;
        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_row_yields_defaults() {
        let db = Database::open_memory().unwrap();
        let store = PreferenceStore::new(&db, "UTC");
        let prefs = store.load("nobody").unwrap();
        assert_eq!(prefs.user_id, "nobody");
        assert_eq!(prefs.schedule.max_reminders_per_day, 10);
    }

    #[test]
    fn save_invalidates_memo() {
        let db = Database::open_memory().unwrap();
        let store = PreferenceStore::new(&db, "UTC");
        let mut prefs = store.load("u1").unwrap();
        prefs.schedule.max_reminders_per_day = 3;
        store.save(&prefs).unwrap();
        assert_eq!(store.load("u1").unwrap().schedule.max_reminders_per_day, 3);

        // A second store (another invocation) sees the write.
        let other = PreferenceStore::new(&db, "UTC");
        assert_eq!(other.load("u1").unwrap().schedule.max_reminders_per_day, 3);
    }

    #[test]
    fn set_value_by_path() {
        let db = Database::open_memory().unwrap();
        let store = PreferenceStore::new(&db, "UTC");
        store.set_value("u1", "schedule.quiet_hours_start", "22:00:00").unwrap();
        store.set_value("u1", "timezone", "Europe/Paris").unwrap();
        assert_eq!(
            store.get_value("u1", "schedule.quiet_hours_start").unwrap().as_deref(),
            Some("22:00:00")
        );
        let prefs = store.load("u1").unwrap();
        assert_eq!(store.timezone(&prefs), chrono_tz::Europe::Paris);
        assert!(store.set_value("u1", "schedule.no_such", "1").is_err());
    }

    #[test]
    fn bad_timezone_falls_back_to_default() {
        let db = Database::open_memory().unwrap();
        let store = PreferenceStore::new(&db, "America/New_York");
        let mut prefs = UserPreferences::defaults_for("u1");
        prefs.timezone = Some("Mars/Olympus".into());
        assert_eq!(store.timezone(&prefs), chrono_tz::America::New_York);
    }
}
