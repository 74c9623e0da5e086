//! User trigger rules and the per-rule firing ledger.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::database::{fmt_ts, parse_opt_ts, parse_ts};
use super::Database;
use crate::error::Result;
use crate::popup::{clamp_priority, RuleCondition, TriggerRule};

/// Rate-limit inputs for one rule of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleFiringStats {
    pub last_fired: Option<DateTime<Utc>>,
    /// Firings inside the queried day.
    pub fired_today: u32,
}

const RULE_COLUMNS: &str = "id, user_id, trigger_event_type, template_key, conditions, priority,
     cooldown_seconds, max_per_day, ttl_seconds, enabled, created_at";

fn rule_row(row: &Row<'_>) -> rusqlite::Result<(TriggerRule, String, String)> {
    Ok((
        TriggerRule {
            id: row.get(0)?,
            user_id: row.get(1)?,
            trigger_event_type: row.get(2)?,
            template_key: row.get(3)?,
            conditions: Vec::new(),
            priority: clamp_priority(row.get(5)?),
            cooldown_seconds: row.get(6)?,
            max_per_day: row.get(7)?,
            ttl_seconds: row.get(8)?,
            enabled: row.get(9)?,
            created_at: None,
        },
        row.get(4)?,
        row.get(10)?,
    ))
}

fn decode_rule((mut rule, conditions, created_at): (TriggerRule, String, String)) -> Result<TriggerRule> {
    rule.conditions = serde_json::from_str::<Vec<RuleCondition>>(&conditions)?;
    rule.created_at = Some(parse_ts("created_at", &created_at)?);
    Ok(rule)
}

impl Database {
    pub fn insert_trigger_rule(&self, rule: &TriggerRule) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO trigger_rules ({RULE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                rule.id,
                rule.user_id,
                rule.trigger_event_type,
                rule.template_key,
                serde_json::to_string(&rule.conditions)?,
                rule.priority,
                rule.cooldown_seconds,
                rule.max_per_day,
                rule.ttl_seconds,
                rule.enabled,
                fmt_ts(rule.created_at.unwrap_or_else(Utc::now)),
            ],
        )?;
        Ok(())
    }

    /// A user's rules, optionally only those for one event type.
    pub fn list_trigger_rules(&self, user_id: &str, event_type: Option<&str>) -> Result<Vec<TriggerRule>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM trigger_rules
             WHERE user_id = ?1 AND (?2 IS NULL OR trigger_event_type = ?2)
             ORDER BY priority DESC, created_at ASC"
        ))?;
        let rows = stmt.query_map(params![user_id, event_type], rule_row)?;
        rows.map(|r| decode_rule(r?)).collect()
    }

    pub fn delete_trigger_rule(&self, user_id: &str, id: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "DELETE FROM trigger_rules WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
        )?;
        Ok(changed == 1)
    }

    pub fn set_trigger_rule_enabled(&self, user_id: &str, id: &str, enabled: bool) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE trigger_rules SET enabled = ?1 WHERE user_id = ?2 AND id = ?3",
            params![enabled, user_id, id],
        )?;
        Ok(changed == 1)
    }

    pub fn record_rule_firing(&self, user_id: &str, rule_key: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO rule_firings (user_id, rule_key, fired_at) VALUES (?1, ?2, ?3)",
            params![user_id, rule_key, fmt_ts(at)],
        )?;
        Ok(())
    }

    /// Last firing overall and firings within `[day_start, day_end)`.
    pub fn rule_firing_stats(
        &self,
        user_id: &str,
        rule_key: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<RuleFiringStats> {
        let (last, today): (Option<String>, u32) = self.conn().query_row(
            "SELECT MAX(fired_at),
                    COALESCE(SUM(CASE WHEN fired_at >= ?3 AND fired_at < ?4 THEN 1 ELSE 0 END), 0)
             FROM rule_firings WHERE user_id = ?1 AND rule_key = ?2",
            params![user_id, rule_key, fmt_ts(day_start), fmt_ts(day_end)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(RuleFiringStats {
            last_fired: parse_opt_ts("fired_at", last)?,
            fired_today: today,
        })
    }
}
