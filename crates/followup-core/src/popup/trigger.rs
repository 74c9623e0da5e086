//! Event → popup pipeline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::rule::{PopupTemplate, TriggerRule};
use super::{Popup, PopupStatus};
use crate::error::Result;
use crate::events::Event;
use crate::storage::{Config, Database, PreferenceStore};
use crate::tz::local_day_bounds;

/// What ingesting one event produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingested {
    pub event_id: i64,
    pub popups: Vec<Popup>,
}

pub struct TriggerEngine<'a> {
    db: &'a Database,
    prefs: PreferenceStore<'a>,
    default_ttl: Duration,
}

impl<'a> TriggerEngine<'a> {
    pub fn new(db: &'a Database, config: &Config) -> Self {
        Self {
            db,
            prefs: PreferenceStore::new(db, config.engine.default_timezone.clone()),
            default_ttl: Duration::minutes(config.popups.default_ttl_minutes.max(1)),
        }
    }

    /// Persist `event` and enqueue the popups its rules produce.
    ///
    /// The user's enabled rules for the event type are used; when there are
    /// none, the built-in mapping applies. Each rule is rate-limited by
    /// its cooldown and daily cap, counted at the event's `created_at`.
    pub fn ingest(&self, event: &Event) -> Result<Ingested> {
        let event_id = self.db.append_event(event)?;

        let mut rules: Vec<TriggerRule> = self
            .db
            .list_trigger_rules(&event.user_id, Some(event.event_type()))?
            .into_iter()
            .filter(|r| r.enabled)
            .collect();
        if rules.is_empty() {
            rules.extend(TriggerRule::builtin(&event.user_id, event.event_type()));
        }

        let mut popups = Vec::new();
        for rule in rules.iter().filter(|r| r.matches(event)) {
            if let Some(popup) = self.fire(rule, event)? {
                popups.push(popup);
            }
        }
        Ok(Ingested { event_id, popups })
    }

    fn fire(&self, rule: &TriggerRule, event: &Event) -> Result<Option<Popup>> {
        let now = event.created_at;
        let Some(template) = PopupTemplate::find(&rule.template_key) else {
            tracing::warn!(rule = %rule.id, template = %rule.template_key, "rule references unknown template");
            return Ok(None);
        };

        if !self.within_limits(rule, now)? {
            return Ok(None);
        }

        let rendered = template.render(event);
        let ttl = rule
            .ttl_seconds
            .map(Duration::seconds)
            .unwrap_or(self.default_ttl);
        let popup = Popup {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: event.user_id.clone(),
            reminder_id: event.reminder_id.clone(),
            rule_key: rule.id.clone(),
            template_type: rendered.template_type,
            title: rendered.title,
            message: rendered.message,
            affirmation: None,
            payload: rendered.payload,
            priority: rule.priority,
            status: PopupStatus::Queued,
            queued_at: now,
            displayed_at: None,
            closed_at: None,
            snooze_until: None,
            expires_at: Some(now + ttl),
            action_taken: None,
        };

        let tx = self.db.conn().unchecked_transaction()?;
        self.db.insert_popup(&popup)?;
        self.db.record_rule_firing(&event.user_id, &rule.id, now)?;
        tx.commit()?;

        tracing::info!(
            popup_id = %popup.id,
            user_id = %popup.user_id,
            rule = %rule.id,
            priority = popup.priority,
            "popup queued"
        );
        Ok(Some(popup))
    }

    fn within_limits(&self, rule: &TriggerRule, now: DateTime<Utc>) -> Result<bool> {
        let prefs = self.prefs.load(&rule.user_id)?;
        let tz = self.prefs.timezone(&prefs);
        let (day_start, day_end) = local_day_bounds(tz, now);
        let stats = self
            .db
            .rule_firing_stats(&rule.user_id, &rule.id, day_start, day_end)?;

        if rule.cooldown_seconds > 0 {
            if let Some(last) = stats.last_fired {
                if now < last + Duration::seconds(rule.cooldown_seconds) {
                    tracing::debug!(rule = %rule.id, "rule cooling down");
                    return Ok(false);
                }
            }
        }
        if rule.max_per_day > 0 && stats.fired_today >= rule.max_per_day {
            tracing::debug!(rule = %rule.id, fired = stats.fired_today, "rule daily cap reached");
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::events::{EventPayload, EventSource};
    use crate::popup::RuleCondition;
    use crate::storage::EventQuery;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, h, m, s).unwrap()
    }

    fn completed(at: DateTime<Utc>) -> Event {
        Event::new(
            "u1",
            EventPayload::ReminderCompleted { reminder_id: "r1".into() },
            EventSource::User,
            at,
        )
    }

    #[test]
    fn builtin_rule_applies_when_user_has_none() {
        let db = Database::open_memory().unwrap();
        let engine = TriggerEngine::new(&db, &Config::default());
        let out = engine.ingest(&completed(at(10, 0, 0))).unwrap();
        assert_eq!(out.popups.len(), 1);
        let popup = &out.popups[0];
        assert_eq!(popup.template_type, "success");
        assert_eq!(popup.priority, 5);
        assert_eq!(popup.expires_at, Some(at(10, 0, 0) + Duration::days(1)));
        assert_eq!(db.count_events(&EventQuery::for_user("u1")).unwrap(), 1);
    }

    #[test]
    fn cooldown_blocks_rapid_refire() {
        let db = Database::open_memory().unwrap();
        let engine = TriggerEngine::new(&db, &Config::default());
        assert_eq!(engine.ingest(&completed(at(10, 0, 0))).unwrap().popups.len(), 1);
        assert!(engine.ingest(&completed(at(10, 0, 30))).unwrap().popups.is_empty());
        assert_eq!(engine.ingest(&completed(at(10, 1, 0))).unwrap().popups.len(), 1);
        // Every event is still on the audit trail.
        assert_eq!(db.count_events(&EventQuery::for_user("u1")).unwrap(), 3);
    }

    #[test]
    fn daily_cap_per_rule() {
        let db = Database::open_memory().unwrap();
        let mut rule = TriggerRule::new("u1", "reminder_completed", "success", 9);
        rule.max_per_day = 2;
        db.insert_trigger_rule(&rule).unwrap();
        let engine = TriggerEngine::new(&db, &Config::default());

        let fired: usize = (0..4)
            .map(|i| engine.ingest(&completed(at(10 + i, 0, 0))).unwrap().popups.len())
            .sum();
        assert_eq!(fired, 2);

        // Next local day resets the cap.
        let tomorrow = completed(at(10, 0, 0) + Duration::days(1));
        assert_eq!(engine.ingest(&tomorrow).unwrap().popups.len(), 1);
    }

    #[test]
    fn user_rules_replace_builtin_and_respect_conditions() {
        let db = Database::open_memory().unwrap();
        let mut rule = TriggerRule::new("u1", "reminder_completed", "streak", 3);
        rule.conditions = vec![RuleCondition::HasContact];
        db.insert_trigger_rule(&rule).unwrap();
        let engine = TriggerEngine::new(&db, &Config::default());

        // Condition fails and the built-in mapping is not consulted.
        assert!(engine.ingest(&completed(at(10, 0, 0))).unwrap().popups.is_empty());

        let with_contact = completed(at(11, 0, 0)).with_contact(Some("c1".into()));
        let out = engine.ingest(&with_contact).unwrap();
        assert_eq!(out.popups.len(), 1);
        assert_eq!(out.popups[0].rule_key, rule.id);
        assert_eq!(out.popups[0].priority, 3);
    }

    #[test]
    fn events_without_mapping_only_log() {
        let db = Database::open_memory().unwrap();
        let engine = TriggerEngine::new(&db, &Config::default());
        let out = engine
            .ingest(&Event::new(
                "u1",
                EventPayload::PopupShown { popup_id: "p".into() },
                EventSource::System,
                at(10, 0, 0),
            ))
            .unwrap();
        assert!(out.popups.is_empty());
        assert!(out.event_id > 0);
    }
}
