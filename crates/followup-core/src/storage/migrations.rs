//! Database schema migrations.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: reminders, preferences, the event log, bundles and kv.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS reminders (
            id                  TEXT PRIMARY KEY,
            user_id             TEXT NOT NULL,
            message             TEXT NOT NULL,
            scheduled_time      TEXT NOT NULL,
            notification_method TEXT NOT NULL DEFAULT 'in_app',
            status              TEXT NOT NULL DEFAULT 'pending',
            contact_id          TEXT,
            contact_name        TEXT,
            sent_at             TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS preferences (
            user_id     TEXT PRIMARY KEY,
            data        TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            event_type  TEXT NOT NULL,
            event_data  TEXT NOT NULL DEFAULT '{}',
            contact_id  TEXT,
            reminder_id TEXT,
            source      TEXT NOT NULL DEFAULT 'system',
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bundles (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            bundle_time     TEXT NOT NULL,
            delivery_format TEXT NOT NULL DEFAULT 'list',
            delivered       INTEGER NOT NULL DEFAULT 0,
            delivered_at    TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bundle_members (
            bundle_id   TEXT NOT NULL REFERENCES bundles(id) ON DELETE CASCADE,
            reminder_id TEXT NOT NULL,
            position    INTEGER NOT NULL,
            PRIMARY KEY (bundle_id, reminder_id)
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reminders_user_status ON reminders(user_id, status);
        CREATE INDEX IF NOT EXISTS idx_reminders_user_sent_at ON reminders(user_id, sent_at);
        CREATE INDEX IF NOT EXISTS idx_events_user_type_time ON events(user_id, event_type, created_at);
        CREATE INDEX IF NOT EXISTS idx_events_reminder_type ON events(reminder_id, event_type);
        CREATE INDEX IF NOT EXISTS idx_bundles_user_delivered ON bundles(user_id, delivered, bundle_time);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: popups, user trigger rules and per-rule firing ledger.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS popups (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL,
            reminder_id   TEXT,
            rule_key      TEXT NOT NULL,
            template_type TEXT NOT NULL,
            title         TEXT NOT NULL,
            message       TEXT NOT NULL,
            affirmation   TEXT,
            payload       TEXT NOT NULL DEFAULT '{}',
            priority      INTEGER NOT NULL DEFAULT 5,
            status        TEXT NOT NULL DEFAULT 'queued',
            queued_at     TEXT NOT NULL,
            displayed_at  TEXT,
            closed_at     TEXT,
            snooze_until  TEXT,
            expires_at    TEXT,
            action_taken  TEXT
        );

        CREATE TABLE IF NOT EXISTS trigger_rules (
            id                 TEXT PRIMARY KEY,
            user_id            TEXT NOT NULL,
            trigger_event_type TEXT NOT NULL,
            template_key       TEXT NOT NULL,
            conditions         TEXT NOT NULL DEFAULT '[]',
            priority           INTEGER NOT NULL DEFAULT 5,
            cooldown_seconds   INTEGER NOT NULL DEFAULT 0,
            max_per_day        INTEGER NOT NULL DEFAULT 0,
            ttl_seconds        INTEGER,
            enabled            INTEGER NOT NULL DEFAULT 1,
            created_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rule_firings (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id  TEXT NOT NULL,
            rule_key TEXT NOT NULL,
            fired_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_popups_user_status ON popups(user_id, status, priority, queued_at);
        CREATE INDEX IF NOT EXISTS idx_trigger_rules_user_type ON trigger_rules(user_id, trigger_event_type);
        CREATE INDEX IF NOT EXISTS idx_rule_firings_user_rule ON rule_firings(user_id, rule_key, fired_at);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: snooze history, rolling snooze patterns and the affirmation ledger.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS snooze_history (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            reminder_id      TEXT,
            duration_minutes INTEGER NOT NULL,
            reason           TEXT NOT NULL,
            time_of_day      INTEGER NOT NULL,
            day_of_week      INTEGER NOT NULL,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS snooze_patterns (
            user_id     TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            bucket      INTEGER NOT NULL,
            samples     TEXT NOT NULL DEFAULT '[]',
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, day_of_week, bucket)
        );

        CREATE TABLE IF NOT EXISTS affirmation_usage (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id        TEXT NOT NULL,
            affirmation_id TEXT NOT NULL,
            category       TEXT NOT NULL,
            shown_at       TEXT NOT NULL,
            popup_id       TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_snooze_history_user_time ON snooze_history(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_affirmation_usage_user_time ON affirmation_usage(user_id, shown_at);",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        for table in [
            "reminders",
            "preferences",
            "events",
            "bundles",
            "bundle_members",
            "popups",
            "trigger_rules",
            "rule_firings",
            "snooze_history",
            "snooze_patterns",
            "affirmation_usage",
            "kv",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn test_incremental_migration() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 1);
        assert!(!table_exists(&conn, "popups"));

        migrate(&conn).unwrap();

        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        assert!(table_exists(&conn, "popups"));
        assert!(table_exists(&conn, "affirmation_usage"));
    }
}
